use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, unbounded};
use mreye_core::{AnalogSampleChunk, Block, FixationCriterion, RenderCommand, StimulusSpec};
use mreye_experiment::{
    EventLog, Orchestrator, OutputBoundary, ReplayAcquisition, RewardDispatcher, SessionConfig,
    SessionError, SequenceScheduler, load_sequence, save_sequence,
};
use mreye_timing::ManualTimer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::Span;

const HIGH: f64 = 5.0;
const LOW: f64 = 0.0;

struct CountingOutput(Arc<AtomicUsize>);

impl OutputBoundary for CountingOutput {
    fn write_waveform(&mut self, _waveform: &[f64]) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Ten samples at one trigger level; nine of them on the central target, one
/// ten degrees off it.
fn cycle_chunk(trigger: f64) -> AnalogSampleChunk {
    let mut gaze_x = vec![0.0; 10];
    gaze_x[9] = 1.0;
    AnalogSampleChunk::new(&gaze_x, &[0.0; 10], &[trigger; 10]).unwrap()
}

fn central_fixation(min_proportion: f64) -> FixationCriterion {
    FixationCriterion {
        target_x: 0.0,
        target_y: 0.0,
        radius: 5.0,
        min_proportion,
    }
}

fn dot() -> StimulusSpec {
    StimulusSpec::Circle {
        x: 0.0,
        y: 0.0,
        radius: 0.25,
        color: [0, 0, 255],
        z: 1,
    }
}

struct Session {
    orchestrator: Orchestrator<fs::File, ManualTimer>,
    commands: Receiver<RenderCommand>,
    rewards: Arc<AtomicUsize>,
}

fn session(dir: &Path, blocks: Vec<Block>) -> Session {
    let (tx, commands) = unbounded();
    let rewards = Arc::new(AtomicUsize::new(0));
    let dispatcher = RewardDispatcher::spawn(
        CountingOutput(Arc::clone(&rewards)),
        vec![5.0, -5.0],
        Span::none(),
    )
    .unwrap();
    let log = EventLog::create(&dir.join("data.txt"), ManualTimer::new()).unwrap();
    let orchestrator = Orchestrator::new(
        &SessionConfig::default(),
        SequenceScheduler::new(blocks, tx),
        dispatcher,
        log,
        Span::none(),
    );
    Session {
        orchestrator,
        commands,
        rewards,
    }
}

fn event_names(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("data.txt"))
        .unwrap()
        .lines()
        .map(|line| {
            // drop the trailing timestamp
            let (event, _elapsed) = line.rsplit_once(' ').unwrap();
            event.to_string()
        })
        .collect()
}

#[test]
fn fixated_cycles_are_rewarded_then_block_advances() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = vec![
        Block::new("fixate", 2)
            .with_stimulus(dot())
            .with_fixation(central_fixation(0.8)),
        Block::new("rest", 1),
    ];
    let mut session = session(dir.path(), blocks);
    let mut acquisition = ReplayAcquisition::new(
        [HIGH, LOW, HIGH, LOW, HIGH, LOW]
            .into_iter()
            .map(cycle_chunk)
            .collect(),
    );

    let summary = session.orchestrator.run(&mut acquisition).unwrap();

    assert_eq!(
        event_names(dir.path()),
        [
            "BLOCK_START fixate",
            "TR_LOW",
            "REWARD 90.00",
            "TR_HIGH",
            "TR_LOW",
            "REWARD 90.00",
            "BLOCK_START rest",
            "TR_HIGH",
            "TR_LOW",
        ]
    );
    assert_eq!(summary.rewards_earned, 2);
    assert_eq!(summary.falling_edges, 3);
    assert_eq!(summary.blocks_completed, 2);
    let delivery = summary.reward_delivery;
    assert_eq!(delivery.started + delivery.dropped, 2);
    assert_eq!(session.rewards.load(Ordering::SeqCst) as u64, delivery.started);
    assert!(acquisition.is_stopped());

    let commands: Vec<_> = session.commands.try_iter().collect();
    assert_eq!(
        commands,
        [
            RenderCommand::AddObjects(vec![dot()]),
            RenderCommand::Clear,
            RenderCommand::Clear,
            RenderCommand::Terminate,
        ]
    );
}

#[test]
fn blocks_without_criterion_never_reward() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path(), vec![Block::new("rest", 3)]);
    let mut acquisition = ReplayAcquisition::new(
        [LOW, HIGH, LOW, HIGH, LOW]
            .into_iter()
            .map(|level| AnalogSampleChunk::new(&[0.0; 4], &[0.0; 4], &[level; 4]).unwrap())
            .collect(),
    );

    let summary = session.orchestrator.run(&mut acquisition).unwrap();

    assert_eq!(summary.rewards_earned, 0);
    assert_eq!(summary.reward_delivery.started, 0);
    assert_eq!(session.rewards.load(Ordering::SeqCst), 0);
    assert!(!event_names(dir.path()).iter().any(|e| e.starts_with("REWARD")));
}

#[test]
fn missed_criterion_is_not_rewarded() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = vec![Block::new("strict", 1).with_fixation(central_fixation(0.95))];
    let mut session = session(dir.path(), blocks);
    let mut acquisition = ReplayAcquisition::new(vec![cycle_chunk(HIGH), cycle_chunk(LOW)]);

    let summary = session.orchestrator.run(&mut acquisition).unwrap();

    assert_eq!(summary.rewards_earned, 0);
    assert_eq!(event_names(dir.path()), ["BLOCK_START strict", "TR_LOW"]);
}

#[test]
fn stream_ending_early_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(dir.path(), vec![Block::new("long", 5)]);
    let mut acquisition = ReplayAcquisition::new(vec![cycle_chunk(HIGH), cycle_chunk(LOW)]);

    let result = session.orchestrator.run(&mut acquisition);

    assert!(matches!(result, Err(SessionError::AcquisitionLost)));
    assert!(acquisition.is_stopped());
    let commands: Vec<_> = session.commands.try_iter().collect();
    assert_eq!(commands.last(), Some(&RenderCommand::Terminate));
}

#[test]
fn replayed_recording_drives_the_same_session() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("analog_data.bin");
    let mut recorder = mreye_experiment::AnalogRecorder::create(&recording).unwrap();
    for level in [HIGH, LOW, HIGH, LOW] {
        recorder.record(&cycle_chunk(level)).unwrap();
    }
    recorder.finish().unwrap();

    let blocks = vec![Block::new("fixate", 2).with_fixation(central_fixation(0.8))];
    let mut session = session(dir.path(), blocks);
    let mut acquisition = ReplayAcquisition::from_recording(&recording, 10).unwrap();

    let summary = session.orchestrator.run(&mut acquisition).unwrap();
    assert_eq!(summary.rewards_earned, 2);
    assert_eq!(summary.chunks, 4);
}

#[test]
fn sequence_file_round_trips_block_for_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sequence.json");
    let blocks = vec![
        Block::new("pre_triggers", 31),
        Block::new("task", 11)
            .with_stimulus(dot())
            .with_stimulus(StimulusSpec::Video {
                path: "stimuli/clip".into(),
                x: -2.5,
                y: 1.0,
                z: 0,
                looping: false,
                fps: Some(25.0),
            })
            .with_fixation(central_fixation(0.8)),
        Block::new("baseline", 14),
    ];

    save_sequence(&path, &blocks).unwrap();
    assert_eq!(load_sequence(&path).unwrap(), blocks);
}

#[test]
fn sequence_file_keeps_every_float_bit_for_bit() {
    let mut rng = StdRng::seed_from_u64(0x6d72_6579);
    let mut finite = || loop {
        let value = f64::from_bits(rng.random::<u64>());
        if value.is_finite() {
            break value;
        }
    };
    let blocks: Vec<Block> = (0..200)
        .map(|i| {
            Block::new(format!("block_{i}"), 1)
                .with_stimulus(StimulusSpec::Circle {
                    x: finite(),
                    y: finite(),
                    radius: finite().abs(),
                    color: [0, 0, 255],
                    z: 1,
                })
                .with_stimulus(StimulusSpec::Video {
                    path: "stimuli/clip".into(),
                    x: finite(),
                    y: finite(),
                    z: 0,
                    looping: true,
                    fps: Some(finite().abs().max(f64::MIN_POSITIVE)),
                })
                .with_fixation(FixationCriterion {
                    target_x: finite(),
                    target_y: finite(),
                    radius: finite().abs(),
                    min_proportion: finite().abs().fract(),
                })
        })
        .collect();
    // needs a correctly rounded parser
    let tiny = Block::new("tiny", 1).with_fixation(FixationCriterion {
        target_x: 1.0715660391465826e-75,
        target_y: 0.1 + 0.2,
        radius: 5.0,
        min_proportion: 0.8,
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sequence.json");
    let mut all = blocks;
    all.push(tiny);
    save_sequence(&path, &all).unwrap();
    assert_eq!(load_sequence(&path).unwrap(), all);
}

#[test]
fn sequence_file_field_names_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sequence.json");
    fs::write(
        &path,
        r#"[
            {"name": "baseline", "n_triggers": 14},
            {"name": "task", "n_triggers": 11,
             "stimuli": [
                {"type": "circle", "x": 0, "y": 0, "c": [0, 0, 255], "r": 0.25, "z": 1},
                {"type": "video", "path": "stimuli/clip", "x": 0, "y": 0, "z": 0}
             ],
             "fixation": {"x": 0, "y": 0, "radius": 5, "proportion": 0.8}}
        ]"#,
    )
    .unwrap();

    let blocks = load_sequence(&path).unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[1].stimuli[0], dot());
    assert!(matches!(
        blocks[1].stimuli[1],
        StimulusSpec::Video { looping: true, .. }
    ));
    assert_eq!(blocks[1].fixation_criterion, Some(central_fixation(0.8)));
}
