use std::collections::VecDeque;

use crossbeam_channel::Sender;
use mreye_core::{Block, RenderCommand};
use tracing::{debug, info};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No block started yet.
    Idle,
    Active,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Started,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseOutcome {
    /// No active block; the pulse is not counted.
    Ignored,
    Counting { pulses: u32, target: u32 },
    /// The active block completed and the next one started.
    Advanced,
    /// The last block completed.
    Done,
}

/// Walks the block sequence in order, one trigger-counted block at a time, and
/// tells the renderer what to show.
#[derive(Debug)]
pub struct SequenceScheduler {
    pending: VecDeque<Block>,
    active: Option<Block>,
    pulses_this_block: u32,
    state: SchedulerState,
    completed: usize,
    commands: Sender<RenderCommand>,
}

impl SequenceScheduler {
    pub fn new(blocks: impl IntoIterator<Item = Block>, commands: Sender<RenderCommand>) -> Self {
        Self {
            pending: blocks.into_iter().collect(),
            active: None,
            pulses_this_block: 0,
            state: SchedulerState::Idle,
            completed: 0,
            commands,
        }
    }

    pub fn current(&self) -> Option<&Block> {
        self.active.as_ref()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn pulses_this_block(&self) -> u32 {
        self.pulses_this_block
    }

    pub fn completed_blocks(&self) -> usize {
        self.completed
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Starts the next pending block, or finishes the sequence when none is left.
    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        if self.state == SchedulerState::Done {
            return Ok(Advance::Done);
        }
        self.pulses_this_block = 0;
        match self.pending.pop_front() {
            Some(block) => {
                info!(block = %block.name, target = block.trigger_target, "starting block");
                if !block.stimuli.is_empty() {
                    self.send(RenderCommand::AddObjects(block.stimuli.clone()))?;
                }
                self.active = Some(block);
                self.state = SchedulerState::Active;
                Ok(Advance::Started)
            }
            None => {
                info!(blocks = self.completed, "sequence finished");
                self.active = None;
                self.state = SchedulerState::Done;
                Ok(Advance::Done)
            }
        }
    }

    /// Counts one completed trigger cycle against the active block.
    pub fn record_pulse(&mut self) -> Result<PulseOutcome, SessionError> {
        let Some(block) = &self.active else {
            return Ok(PulseOutcome::Ignored);
        };
        let target = block.trigger_target;
        self.pulses_this_block += 1;
        debug!(pulses = self.pulses_this_block, target, "trigger pulse");
        if self.pulses_this_block < target {
            return Ok(PulseOutcome::Counting {
                pulses: self.pulses_this_block,
                target,
            });
        }

        debug!(block = %block.name, "block finished");
        self.completed += 1;
        self.pulses_this_block = 0;
        self.send(RenderCommand::Clear)?;
        Ok(match self.advance()? {
            Advance::Started => PulseOutcome::Advanced,
            Advance::Done => PulseOutcome::Done,
        })
    }

    pub fn send(&self, command: RenderCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::RendererDisconnected)
    }
}
