//! Reward delivery.
//!
//! The waveform is written by a dedicated worker thread so the orchestrator never
//! waits on the output hardware. Only one delivery is in flight at a time; a
//! request that arrives while the pump is running is dropped.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Sender, TrySendError, bounded};
use mreye_core::logging::spawn_in_span;
use mreye_timing::{HighPrecisionTimer, Timer};
use tracing::{Span, debug, error, warn};

use crate::config::RewardConfig;

/// Analog output line driving the reward pump.
pub trait OutputBoundary: Send + 'static {
    /// Plays `waveform` and returns once it has been delivered.
    fn write_waveform(&mut self, waveform: &[f64]) -> anyhow::Result<()>;
}

/// Bipolar pulse: `+amplitude` for the configured duration, then `-amplitude` for
/// the same duration.
pub fn reward_waveform(config: &RewardConfig, sampling_rate: f64) -> Vec<f64> {
    let phase_samples = (config.duration_s * sampling_rate).round() as usize;
    let mut waveform = vec![config.amplitude_v; phase_samples];
    waveform.resize(phase_samples * 2, -config.amplitude_v);
    waveform
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Started,
    /// A delivery was already running.
    Dropped,
    /// The output failed earlier and the worker has stopped.
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewardStats {
    pub started: u64,
    pub dropped: u64,
    pub unavailable: u64,
}

pub struct RewardDispatcher {
    requests: Option<Sender<()>>,
    busy: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stats: RewardStats,
    span: Span,
}

impl RewardDispatcher {
    pub fn spawn<O: OutputBoundary>(mut output: O, waveform: Vec<f64>, span: Span) -> io::Result<Self> {
        let (requests, rx) = bounded::<()>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = Arc::clone(&busy);

        let worker = spawn_in_span("reward", span.clone(), move || {
            while rx.recv().is_ok() {
                if let Err(e) = output.write_waveform(&waveform) {
                    error!("reward output failed, stopping reward delivery: {e:#}");
                    // Disconnect before clearing `busy` so no request slips in.
                    drop(rx);
                    worker_busy.store(false, Ordering::Release);
                    return;
                }
                worker_busy.store(false, Ordering::Release);
                debug!(samples = waveform.len(), "reward delivered");
            }
        })?;

        Ok(Self {
            requests: Some(requests),
            busy,
            worker: Some(worker),
            stats: RewardStats::default(),
            span,
        })
    }

    /// Requests one reward without waiting for it to be delivered.
    pub fn dispatch(&mut self) -> DispatchOutcome {
        let _entered = self.span.enter();
        let Some(requests) = &self.requests else {
            self.stats.unavailable += 1;
            return DispatchOutcome::Unavailable;
        };
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("reward already in flight, request dropped");
            self.stats.dropped += 1;
            return DispatchOutcome::Dropped;
        }
        match requests.try_send(()) {
            Ok(()) => {
                self.stats.started += 1;
                DispatchOutcome::Started
            }
            Err(TrySendError::Full(())) => {
                // Worker has not yet picked up the previous request.
                warn!("reward already queued, request dropped");
                self.stats.dropped += 1;
                DispatchOutcome::Dropped
            }
            Err(TrySendError::Disconnected(())) => {
                self.busy.store(false, Ordering::Release);
                error!("reward output unavailable");
                self.stats.unavailable += 1;
                DispatchOutcome::Unavailable
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RewardStats {
        self.stats
    }

    /// Lets an in-flight delivery finish, then stops the worker.
    pub fn shutdown(&mut self) {
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(parent: &self.span, "reward worker panicked");
            }
        }
    }
}

impl Drop for RewardDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Output stand-in that takes as long as the real pump would and delivers nothing.
#[derive(Debug, Clone)]
pub struct SimulatedOutput {
    sampling_rate: f64,
    timer: HighPrecisionTimer,
}

impl SimulatedOutput {
    pub fn new(sampling_rate: f64) -> Self {
        Self {
            sampling_rate,
            timer: HighPrecisionTimer::new(),
        }
    }
}

impl OutputBoundary for SimulatedOutput {
    fn write_waveform(&mut self, waveform: &[f64]) -> anyhow::Result<()> {
        let duration = Duration::try_from_secs_f64(waveform.len() as f64 / self.sampling_rate)
            .with_context(|| format!("waveform duration at {} Hz", self.sampling_rate))?;
        debug!(?duration, "simulated reward pulse");
        self.timer.sleep(duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct GatedOutput {
        gate: Receiver<()>,
        writes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl OutputBoundary for GatedOutput {
        fn write_waveform(&mut self, waveform: &[f64]) -> anyhow::Result<()> {
            assert!(!waveform.is_empty());
            self.gate.recv()?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("device unplugged");
            }
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn gated(fail: bool) -> (RewardDispatcher, Sender<()>, Arc<AtomicUsize>) {
        let (gate_tx, gate) = bounded(4);
        let writes = Arc::new(AtomicUsize::new(0));
        let output = GatedOutput {
            gate,
            writes: Arc::clone(&writes),
            fail,
        };
        let dispatcher =
            RewardDispatcher::spawn(output, vec![5.0, -5.0], Span::none()).unwrap();
        (dispatcher, gate_tx, writes)
    }

    #[test]
    fn waveform_is_bipolar() {
        let waveform = reward_waveform(&RewardConfig::default(), 2000.0);
        assert_eq!(waveform.len(), 400);
        assert!(waveform[..200].iter().all(|&v| v == 5.0));
        assert!(waveform[200..].iter().all(|&v| v == -5.0));
    }

    #[test]
    fn overlapping_request_is_dropped() {
        let (mut dispatcher, gate, writes) = gated(false);
        assert_eq!(dispatcher.dispatch(), DispatchOutcome::Started);
        assert_eq!(dispatcher.dispatch(), DispatchOutcome::Dropped);

        gate.send(()).unwrap();
        wait_until(|| !dispatcher.is_busy());
        assert_eq!(writes.load(Ordering::SeqCst), 1);

        assert_eq!(dispatcher.dispatch(), DispatchOutcome::Started);
        gate.send(()).unwrap();
        dispatcher.shutdown();
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(
            dispatcher.stats(),
            RewardStats {
                started: 2,
                dropped: 1,
                unavailable: 0
            }
        );
    }

    #[test]
    fn dispatch_does_not_wait_for_delivery() {
        let (mut dispatcher, gate, writes) = gated(false);
        let start = Instant::now();
        assert_eq!(dispatcher.dispatch(), DispatchOutcome::Started);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(writes.load(Ordering::SeqCst), 0);
        gate.send(()).unwrap();
    }

    #[test]
    fn output_failure_stops_delivery() {
        let (mut dispatcher, gate, _writes) = gated(true);
        assert_eq!(dispatcher.dispatch(), DispatchOutcome::Started);
        gate.send(()).unwrap();
        wait_until(|| dispatcher.dispatch() == DispatchOutcome::Unavailable);
        assert!(dispatcher.stats().unavailable >= 1);
    }

    #[test]
    fn simulated_output_rejects_a_zero_sampling_rate() {
        let mut output = SimulatedOutput::new(0.0);
        assert!(output.write_waveform(&[5.0, -5.0]).is_err());
        assert!(output.write_waveform(&[]).is_err());
    }
}
