mod display;
mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, unbounded};
use mreye_core::{Block, RenderCommand, logging::spawn_in_span};
use mreye_experiment::{
    AcquisitionBoundary, DisplayConfig, EventLog, Orchestrator, ReplayAcquisition,
    RewardDispatcher, SequenceScheduler, SessionConfig, SimulatedAcquisition, SimulatedGaze,
    SimulatedOutput, StopHandle, default_order, generate_sequence, load_sequence,
    read_order_file, reward_waveform, save_sequence,
};
use mreye_render::{DisplayRenderer, MemoryTarget};
use mreye_timing::HighPrecisionTimer;
use tracing::{Span, info, info_span, warn};

use crate::display::DisplayApp;
use crate::session::{SessionDir, session_dispatch};

const STIMULI_DIR: &str = "stimuli";

#[derive(Parser)]
#[command(name = "mreye", version, about = "Gaze-contingent fMRI stimulus sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a session, writing everything under the session directory.
    Run(RunArgs),
    /// Write the standard block sequence to a file.
    Generate(GenerateArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Session directory to create; named by the current time when omitted.
    session: Option<PathBuf>,
    /// Block sequence (JSON). The standard sequence is generated when omitted.
    #[arg(long)]
    sequence: Option<PathBuf>,
    /// Session configuration (JSON). Every field defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Feed a previously recorded `analog_data.bin` instead of live samples.
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
    /// Open the experimenter preview window.
    #[arg(long)]
    experimenter: bool,
    /// Render off screen; no windows are opened.
    #[arg(long)]
    headless: bool,
    /// Where the simulated eye looks, in degrees from screen centre.
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    gaze: Option<Vec<f64>>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args)]
struct GenerateArgs {
    out: PathBuf,
    /// One video source per line; empty lines are tasks without video.
    #[arg(long)]
    order: Option<PathBuf>,
    /// Directory scanned for video sources when no order file is given.
    #[arg(long, default_value = STIMULI_DIR)]
    stimuli: PathBuf,
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let order = match &args.order {
        Some(path) => read_order_file(path)?,
        None => default_order(&args.stimuli, &mut rand::rng())?,
    };
    let blocks = generate_sequence(&order);
    save_sequence(&args.out, &blocks)?;
    println!("{} blocks written to {}", blocks.len(), args.out.display());
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let session = SessionDir::create(args.session.clone())?;
    let dispatch = session_dispatch(&session.experiment_log(), args.verbose)?;
    tracing::dispatcher::with_default(&dispatch, || run_session(&session, &args))
}

fn load_blocks(args: &RunArgs) -> Result<Vec<Block>> {
    if let Some(path) = &args.sequence {
        return Ok(load_sequence(path)?);
    }
    let order = default_order(Path::new(STIMULI_DIR), &mut rand::rng())?;
    info!(tasks = order.len(), "no sequence given, generated the standard one");
    Ok(generate_sequence(&order))
}

fn run_session(session: &SessionDir, args: &RunArgs) -> Result<()> {
    info!(dir = %session.root().display(), "session started");

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if args.experimenter && config.display.experimenter_rect.is_none() {
        config.display.experimenter_rect = Some(DisplayConfig::DEFAULT_EXPERIMENTER_RECT);
    }
    config.validate().context("invalid session configuration")?;

    let blocks = load_blocks(args)?;
    save_sequence(&session.sequence(), &blocks)?;

    let sampling_rate = config.acquisition.sampling_rate;
    let rewards = RewardDispatcher::spawn(
        SimulatedOutput::new(sampling_rate),
        reward_waveform(&config.reward, sampling_rate),
        info_span!("reward"),
    )
    .context("starting reward output")?;
    let log = EventLog::create(&session.event_log(), HighPrecisionTimer::new())
        .with_context(|| format!("creating {}", session.event_log().display()))?;
    let (commands, display_commands) = unbounded();
    let mut orchestrator = Orchestrator::new(
        &config,
        SequenceScheduler::new(blocks, commands),
        rewards,
        log,
        info_span!("orchestrator"),
    );

    let (mut acquisition, stop) = acquisition(&config, session, args)?;
    let worker = spawn_in_span("orchestrator", Span::current(), move || {
        orchestrator.run(acquisition.as_mut())
    })
    .context("spawning orchestrator")?;

    let display = if args.headless {
        run_headless(&config.display, display_commands)
    } else {
        DisplayApp::new(config.display.clone(), display_commands, info_span!("display")).run()
    };
    if !matches!(display, Ok(true)) {
        match &stop {
            Some(stop) => stop.stop(),
            None => warn!("replayed samples keep flowing until the recording ends"),
        }
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow!("orchestrator thread panicked"))?;
    let completed = display?;
    let summary = outcome.with_context(|| {
        if completed {
            "session failed"
        } else {
            "session aborted by the operator"
        }
    })?;
    info!(
        blocks = summary.blocks_completed,
        samples = summary.samples,
        triggers = summary.falling_edges,
        rewards = summary.rewards_earned,
        reward_pulses = summary.reward_delivery.started,
        rewards_dropped = summary.reward_delivery.dropped,
        events = summary.events_logged,
        "session finished"
    );
    Ok(())
}

type Acquisition = (Box<dyn AcquisitionBoundary>, Option<StopHandle>);

fn acquisition(config: &SessionConfig, session: &SessionDir, args: &RunArgs) -> Result<Acquisition> {
    let span = info_span!("acquisition");
    if let Some(path) = &args.replay {
        let replay = ReplayAcquisition::from_recording(path, config.acquisition.chunk_size)
            .with_context(|| format!("loading recording {}", path.display()))?;
        return Ok((Box::new(replay), None));
    }

    let mut simulated = SimulatedAcquisition::new(config.acquisition.clone(), config.eye, span)
        .with_recording(session.analog_data());
    if let Some(&[x_deg, y_deg]) = args.gaze.as_deref() {
        simulated = simulated.with_gaze(SimulatedGaze {
            x_deg,
            y_deg,
            ..SimulatedGaze::default()
        });
    }
    let stop = simulated.stop_handle();
    Ok((Box::new(simulated), Some(stop)))
}

/// Drives the renderer without a window until `Terminate`.
fn run_headless(config: &DisplayConfig, commands: Receiver<RenderCommand>) -> Result<bool> {
    let mut renderer = DisplayRenderer::new(
        &config.subject,
        config.frame_interval(),
        commands,
        MemoryTarget::new(),
        HighPrecisionTimer::new(),
        info_span!("display"),
    )?;
    renderer.run()?;
    info!(frames = renderer.target().presented(), "headless display finished");
    Ok(true)
}
