//! The live control loop.
//!
//! One thread owns every piece of per-session state: the edge detector, the
//! fixation counts, the block scheduler and the event log. Chunks arrive over the
//! sample channel and are processed strictly in order.

use std::io::Write;

use mreye_core::{AnalogSampleChunk, Block, FixationCriterion, RenderCommand};
use mreye_timing::Timer;
use tracing::{Span, debug, error, info, warn};

use crate::acquisition::AcquisitionBoundary;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event_log::{EventLog, SessionEvent};
use crate::fixation::FixationEvaluator;
use crate::reward::{DispatchOutcome, RewardDispatcher, RewardStats};
use crate::scheduler::{Advance, PulseOutcome, SequenceScheduler};
use crate::trigger::{EdgeEvent, TriggerEdgeDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Counters reported once the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub chunks: u64,
    pub samples: u64,
    pub falling_edges: u64,
    pub rising_edges: u64,
    /// Threshold crossings not reported because a chunk held more than one edge of
    /// the same direction.
    pub suppressed_crossings: u64,
    pub blocks_completed: usize,
    pub rewards_earned: u64,
    pub reward_delivery: RewardStats,
    pub events_logged: usize,
}

pub struct Orchestrator<W: Write, T: Timer> {
    detector: TriggerEdgeDetector,
    fixation: FixationEvaluator,
    scheduler: SequenceScheduler,
    rewards: RewardDispatcher,
    log: EventLog<W, T>,
    summary: SessionSummary,
    started: bool,
    span: Span,
}

impl<W: Write, T: Timer> Orchestrator<W, T> {
    pub fn new(
        config: &SessionConfig,
        scheduler: SequenceScheduler,
        rewards: RewardDispatcher,
        log: EventLog<W, T>,
        span: Span,
    ) -> Self {
        Self {
            detector: TriggerEdgeDetector::new(config.acquisition.trigger_threshold),
            fixation: FixationEvaluator::new(config.eye),
            scheduler,
            rewards,
            log,
            summary: SessionSummary::default(),
            started: false,
            span,
        }
    }

    pub fn scheduler(&self) -> &SequenceScheduler {
        &self.scheduler
    }

    pub fn current_block(&self) -> Option<&Block> {
        self.scheduler.current()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            blocks_completed: self.scheduler.completed_blocks(),
            reward_delivery: self.rewards.stats(),
            events_logged: self.log.len(),
            ..self.summary
        }
    }

    /// Starts the first block. An empty sequence finishes immediately.
    pub fn start(&mut self) -> Result<Flow, SessionError> {
        let span = self.span.clone();
        let _entered = span.enter();
        if self.started {
            return Ok(Flow::Continue);
        }
        self.started = true;
        info!(blocks = self.scheduler.remaining(), "session started");
        match self.scheduler.advance()? {
            Advance::Started => {
                self.log_block_start()?;
                Ok(Flow::Continue)
            }
            Advance::Done => self.finish(),
        }
    }

    /// Processes one chunk: fixation first, then the trigger edges it contains.
    pub fn step(&mut self, chunk: &AnalogSampleChunk) -> Result<Flow, SessionError> {
        let span = self.span.clone();
        let _entered = span.enter();
        self.summary.chunks += 1;
        self.summary.samples += chunk.len() as u64;

        if let Some(criterion) = self.active_criterion() {
            self.fixation
                .accumulate(chunk.gaze_x(), chunk.gaze_y(), &criterion);
        }

        let edges = self.detector.observe(chunk.trigger());
        if edges.suppressed > 0 {
            self.summary.suppressed_crossings += edges.suppressed as u64;
            warn!(
                suppressed = edges.suppressed,
                samples = chunk.len(),
                "trigger crossed the threshold repeatedly within one chunk; chunk is too long for the pulse width"
            );
        }

        for edge in edges.events {
            let flow = match edge {
                EdgeEvent::Falling => self.on_falling_edge()?,
                EdgeEvent::Rising => {
                    self.summary.rising_edges += 1;
                    self.record(SessionEvent::TriggerHigh)?;
                    Flow::Continue
                }
            };
            if flow == Flow::Done {
                return Ok(Flow::Done);
            }
        }
        Ok(Flow::Continue)
    }

    /// Drives the session from `acquisition` until the sequence is done.
    ///
    /// Acquisition is stopped on every exit path. A stream that ends before the
    /// sequence does is fatal: the renderer is told to terminate and
    /// [`SessionError::AcquisitionLost`] is returned.
    pub fn run(
        &mut self,
        acquisition: &mut dyn AcquisitionBoundary,
    ) -> Result<SessionSummary, SessionError> {
        let result = self.drive(acquisition);
        let stopped = acquisition.stop();
        self.rewards.shutdown();

        let span = self.span.clone();
        let _entered = span.enter();
        if let Err(e) = &result {
            error!("session aborted: {e}");
            // Best effort; the renderer may already be gone.
            let _ = self.scheduler.send(RenderCommand::Terminate);
        }
        result?;
        stopped.map_err(SessionError::Acquisition)?;

        let summary = self.summary();
        info!(
            blocks = summary.blocks_completed,
            chunks = summary.chunks,
            rewards = summary.rewards_earned,
            "session finished"
        );
        Ok(summary)
    }

    fn drive(&mut self, acquisition: &mut dyn AcquisitionBoundary) -> Result<(), SessionError> {
        let chunks = acquisition.start().map_err(SessionError::Acquisition)?;
        if self.start()? == Flow::Done {
            return Ok(());
        }
        loop {
            let Ok(chunk) = chunks.recv() else {
                return Err(SessionError::AcquisitionLost);
            };
            if self.step(&chunk)? == Flow::Done {
                return Ok(());
            }
        }
    }

    fn on_falling_edge(&mut self) -> Result<Flow, SessionError> {
        self.summary.falling_edges += 1;
        self.record(SessionEvent::TriggerLow)?;

        if let Some(criterion) = self.active_criterion() {
            let proportion = self.fixation.evaluate();
            let counts = self.fixation.counts();
            if self.fixation.meets(&criterion) {
                let percent_fixated = proportion * 100.0;
                info!(percent_fixated, "fixation criterion met");
                self.summary.rewards_earned += 1;
                if self.rewards.dispatch() != DispatchOutcome::Started {
                    debug!("reward earned but not delivered");
                }
                self.record(SessionEvent::Reward { percent_fixated })?;
            } else {
                debug!(
                    fixated = counts.fixated_samples,
                    total = counts.total_samples,
                    required = criterion.min_proportion,
                    "fixation criterion missed"
                );
            }
        }
        self.fixation.reset();

        match self.scheduler.record_pulse()? {
            PulseOutcome::Advanced => {
                self.log_block_start()?;
                Ok(Flow::Continue)
            }
            PulseOutcome::Done => self.finish(),
            PulseOutcome::Counting { .. } | PulseOutcome::Ignored => Ok(Flow::Continue),
        }
    }

    fn finish(&mut self) -> Result<Flow, SessionError> {
        self.scheduler.send(RenderCommand::Terminate)?;
        Ok(Flow::Done)
    }

    fn active_criterion(&self) -> Option<FixationCriterion> {
        self.scheduler.current().and_then(|b| b.fixation_criterion)
    }

    fn log_block_start(&mut self) -> Result<(), SessionError> {
        let name = match self.scheduler.current() {
            Some(block) => block.name.clone(),
            None => return Ok(()),
        };
        self.record(SessionEvent::BlockStart { name })
    }

    fn record(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        debug!(%event, "event");
        self.log.append(&event).map_err(SessionError::EventLog)
    }
}
