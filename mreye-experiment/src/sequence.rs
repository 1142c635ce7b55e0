//! Sequence files and the standard session layout.

use std::fs;
use std::path::{Path, PathBuf};

use mreye_core::{Block, FixationCriterion, StimulusSpec};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::error::SessionError;

pub const PRE_TRIGGERS: u32 = 31;
pub const BASELINE_TRIGGERS: u32 = 14;
pub const TASK_TRIGGERS: u32 = 11;
/// Blank task blocks added to the default stimulus order.
pub const BLANK_TASKS: usize = 3;

/// Reads a block list and rejects it if any block is malformed.
pub fn load_sequence(path: &Path) -> Result<Vec<Block>, SessionError> {
    let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let blocks: Vec<Block> = serde_json::from_str(&text).map_err(|source| SessionError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    for block in &blocks {
        block.validate()?;
    }
    info!(path = %path.display(), blocks = blocks.len(), "sequence loaded");
    Ok(blocks)
}

pub fn save_sequence(path: &Path, blocks: &[Block]) -> Result<(), SessionError> {
    let io_err = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = serde_json::to_string_pretty(blocks).map_err(|source| SessionError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(io_err)
}

fn fixation_dot() -> StimulusSpec {
    StimulusSpec::Circle {
        x: 0.0,
        y: 0.0,
        radius: 0.25,
        color: [0, 0, 255],
        z: 1,
    }
}

fn task_block(video: Option<&Path>) -> Block {
    let mut block = Block::new("task", TASK_TRIGGERS)
        .with_stimulus(fixation_dot())
        .with_fixation(FixationCriterion {
            target_x: 0.0,
            target_y: 0.0,
            radius: 5.0,
            min_proportion: 0.8,
        });
    if let Some(path) = video {
        block = block.with_stimulus(StimulusSpec::Video {
            path: path.to_string_lossy().into_owned(),
            x: 0.0,
            y: 0.0,
            z: 0,
            looping: true,
            fps: None,
        });
    }
    block
}

/// Builds the standard session: pre-trigger lead-in, then a baseline and a task
/// block per entry of `order` (`None` is a task without video), then a final
/// baseline.
pub fn generate_sequence(order: &[Option<PathBuf>]) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(order.len() * 2 + 2);
    blocks.push(Block::new("pre_triggers", PRE_TRIGGERS));
    for video in order {
        blocks.push(Block::new("baseline", BASELINE_TRIGGERS));
        blocks.push(task_block(video.as_deref()));
    }
    blocks.push(Block::new("baseline", BASELINE_TRIGGERS));
    blocks
}

/// Every video source directly under `stimuli_dir` plus [`BLANK_TASKS`] blank
/// entries, shuffled.
pub fn default_order<R: Rng + ?Sized>(
    stimuli_dir: &Path,
    rng: &mut R,
) -> Result<Vec<Option<PathBuf>>, SessionError> {
    let mut sources = Vec::new();
    if stimuli_dir.is_dir() {
        let entries = fs::read_dir(stimuli_dir).map_err(|source| SessionError::Io {
            path: stimuli_dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| SessionError::Io {
                path: stimuli_dir.to_path_buf(),
                source,
            })?;
            if entry.path().is_dir() {
                sources.push(entry.path());
            }
        }
    }
    // read_dir order is platform dependent
    sources.sort();

    let mut order: Vec<Option<PathBuf>> = sources.into_iter().map(Some).collect();
    order.extend(std::iter::repeat_n(None, BLANK_TASKS));
    order.shuffle(rng);
    Ok(order)
}

/// One source per line; an empty line is a task without video.
pub fn read_order_file(path: &Path) -> Result<Vec<Option<PathBuf>>, SessionError> {
    let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .map(|line| (!line.is_empty()).then(|| PathBuf::from(line)))
        .collect())
}
