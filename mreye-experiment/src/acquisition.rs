//! Analog input boundary.
//!
//! An acquisition source runs on its own thread and hands chunks to the
//! orchestrator over an unbounded channel: the producer never blocks and no chunk
//! is ever discarded.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, unbounded};
use mreye_core::logging::spawn_in_span;
use mreye_core::{AnalogSampleChunk, CHANNELS};
use mreye_timing::{HighPrecisionTimer, Timer};
use rand::Rng;
use tracing::{Span, debug, info, warn};

use crate::config::{AcquisitionConfig, EyeCalibration};

pub trait AcquisitionBoundary: Send {
    /// Begins delivery. The stream ends (the sender is dropped) when delivery
    /// stops for any reason.
    fn start(&mut self) -> anyhow::Result<Receiver<AnalogSampleChunk>>;
    fn stop(&mut self) -> anyhow::Result<()>;
}

/// Raw recording of every acquired chunk: native-endian `f64`, channel-major.
pub struct AnalogRecorder<W: Write> {
    writer: BufWriter<W>,
    chunks: u64,
}

impl AnalogRecorder<File> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> AnalogRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            chunks: 0,
        }
    }

    pub fn record(&mut self, chunk: &AnalogSampleChunk) -> io::Result<()> {
        self.writer.write_all(bytemuck::cast_slice(chunk.as_slice()))?;
        self.chunks += 1;
        Ok(())
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Splits a raw recording back into chunks of `chunk_size` samples per channel.
pub fn read_recording(path: &Path, chunk_size: usize) -> anyhow::Result<Vec<AnalogSampleChunk>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<f64> = bytemuck::pod_collect_to_vec(&bytes);
    let per_chunk = CHANNELS * chunk_size.max(1);
    if values.len() % per_chunk != 0 {
        warn!(
            trailing = values.len() % per_chunk,
            "recording ends with a partial chunk, ignoring it"
        );
    }
    values
        .chunks_exact(per_chunk)
        .map(|c| AnalogSampleChunk::from_channel_major(c.to_vec()).map_err(Into::into))
        .collect()
}

/// Where simulated gaze rests, in degrees, and how far it wanders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedGaze {
    pub x_deg: f64,
    pub y_deg: f64,
    pub jitter_deg: f64,
}

impl Default for SimulatedGaze {
    fn default() -> Self {
        Self {
            x_deg: 0.0,
            y_deg: 0.0,
            jitter_deg: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Real-time stand-in for the analog input card: a steady gaze with jitter and a
/// trigger line that drops low for `pulse_width_s` once every `tr_interval_s`.
pub struct SimulatedAcquisition {
    config: AcquisitionConfig,
    eye: EyeCalibration,
    gaze: SimulatedGaze,
    recording: Option<PathBuf>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<anyhow::Result<()>>>,
    span: Span,
}

impl SimulatedAcquisition {
    pub const TRIGGER_HIGH_V: f64 = 5.0;

    pub fn new(config: AcquisitionConfig, eye: EyeCalibration, span: Span) -> Self {
        Self {
            config,
            eye,
            gaze: SimulatedGaze::default(),
            recording: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            span,
        }
    }

    pub fn with_gaze(mut self, gaze: SimulatedGaze) -> Self {
        self.gaze = gaze;
        self
    }

    pub fn with_recording(mut self, path: impl Into<PathBuf>) -> Self {
        self.recording = Some(path.into());
        self
    }

    /// Handle that ends delivery from another thread. The stream then closes,
    /// which the consumer sees as lost acquisition.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    /// Trigger voltage at `t` seconds: high except during the last `pulse_width_s`
    /// of each interval.
    pub fn trigger_level(config: &AcquisitionConfig, t: f64) -> f64 {
        let phase = t.rem_euclid(config.tr_interval_s);
        if phase >= config.tr_interval_s - config.pulse_width_s {
            0.0
        } else {
            Self::TRIGGER_HIGH_V
        }
    }

    fn produce(
        config: AcquisitionConfig,
        eye: EyeCalibration,
        gaze: SimulatedGaze,
        mut recorder: Option<AnalogRecorder<File>>,
        running: Arc<AtomicBool>,
        tx: Sender<AnalogSampleChunk>,
    ) -> anyhow::Result<()> {
        let timer = HighPrecisionTimer::new();
        let mut rng = rand::rng();
        let n = config.chunk_size;
        let chunk_ns = config.chunk_duration().as_nanos() as u64;
        let mut sample_index: u64 = 0;
        let mut chunk_index: u64 = 0;
        let (mut xs, mut ys, mut trs) = (vec![0.0; n], vec![0.0; n], vec![0.0; n]);

        while running.load(Ordering::Acquire) {
            for i in 0..n {
                let t = (sample_index + i as u64) as f64 / config.sampling_rate;
                let dx = rng.random_range(-1.0..=1.0) * gaze.jitter_deg;
                let dy = rng.random_range(-1.0..=1.0) * gaze.jitter_deg;
                (xs[i], ys[i]) = eye.to_raw(gaze.x_deg + dx, gaze.y_deg + dy);
                trs[i] = Self::trigger_level(&config, t);
            }
            sample_index += n as u64;
            chunk_index += 1;

            // Sample clock: a chunk is ready once its last sample has been taken.
            let due = chunk_index * chunk_ns;
            let now = timer.now();
            if due > now {
                timer.sleep(Duration::from_nanos(due - now));
            }

            let chunk = AnalogSampleChunk::new(&xs, &ys, &trs)?;
            if let Some(recorder) = recorder.as_mut() {
                recorder.record(&chunk).context("writing analog recording")?;
            }
            if tx.send(chunk).is_err() {
                debug!("sample consumer gone");
                break;
            }
        }

        if let Some(recorder) = recorder {
            let chunks = recorder.chunks();
            recorder.finish().context("flushing analog recording")?;
            info!(chunks, "analog recording closed");
        }
        Ok(())
    }
}

impl AcquisitionBoundary for SimulatedAcquisition {
    fn start(&mut self) -> anyhow::Result<Receiver<AnalogSampleChunk>> {
        anyhow::ensure!(self.worker.is_none(), "acquisition already started");
        let recorder = self
            .recording
            .as_deref()
            .map(AnalogRecorder::create)
            .transpose()
            .context("opening analog recording")?;
        let (tx, rx) = unbounded();
        self.running.store(true, Ordering::Release);

        let (config, eye, gaze) = (self.config.clone(), self.eye, self.gaze);
        let running = Arc::clone(&self.running);
        self.worker = Some(spawn_in_span("acquire", self.span.clone(), move || {
            Self::produce(config, eye, gaze, recorder, running, tx)
        })?);
        info!(parent: &self.span,
            rate = self.config.sampling_rate,
            chunk = self.config.chunk_size,
            "simulated acquisition started"
        );
        Ok(rx)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::Release);
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| anyhow::anyhow!("acquisition thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for SimulatedAcquisition {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Delivers a fixed list of chunks, in order, as fast as they are consumed, then
/// ends the stream.
#[derive(Debug, Default)]
pub struct ReplayAcquisition {
    chunks: Vec<AnalogSampleChunk>,
    stopped: bool,
}

impl ReplayAcquisition {
    pub fn new(chunks: Vec<AnalogSampleChunk>) -> Self {
        Self {
            chunks,
            stopped: false,
        }
    }

    pub fn from_recording(path: &Path, chunk_size: usize) -> anyhow::Result<Self> {
        Ok(Self::new(read_recording(path, chunk_size)?))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl AcquisitionBoundary for ReplayAcquisition {
    fn start(&mut self) -> anyhow::Result<Receiver<AnalogSampleChunk>> {
        let (tx, rx) = unbounded();
        for chunk in self.chunks.drain(..) {
            tx.send(chunk)?;
        }
        Ok(rx)
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_pulses_once_per_interval() {
        let config = AcquisitionConfig {
            tr_interval_s: 2.0,
            pulse_width_s: 0.1,
            ..AcquisitionConfig::default()
        };
        let level = |t| SimulatedAcquisition::trigger_level(&config, t);
        assert_eq!(level(0.0), 5.0);
        assert_eq!(level(1.85), 5.0);
        assert_eq!(level(1.95), 0.0);
        assert_eq!(level(2.05), 5.0);
        assert_eq!(level(3.95), 0.0);
    }

    #[test]
    fn recording_round_trips_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analog_data.bin");
        let chunks = vec![
            AnalogSampleChunk::new(&[0.1, 0.2], &[0.3, 0.4], &[5.0, 5.0]).unwrap(),
            AnalogSampleChunk::new(&[-0.1, -0.2], &[0.0, 0.0], &[0.0, 5.0]).unwrap(),
        ];
        let mut recorder = AnalogRecorder::create(&path).unwrap();
        for chunk in &chunks {
            recorder.record(chunk).unwrap();
        }
        assert_eq!(recorder.chunks(), 2);
        recorder.finish().unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 6 * 8);
        assert_eq!(read_recording(&path, 2).unwrap(), chunks);
    }

    #[test]
    fn replay_delivers_in_order_then_ends() {
        let chunks: Vec<_> = (0..3)
            .map(|i| AnalogSampleChunk::new(&[i as f64], &[0.0], &[5.0]).unwrap())
            .collect();
        let mut replay = ReplayAcquisition::new(chunks.clone());
        let rx = replay.start().unwrap();
        let received: Vec<_> = rx.iter().collect();
        assert_eq!(received, chunks);
        replay.stop().unwrap();
        assert!(replay.is_stopped());
    }

    #[test]
    fn simulated_acquisition_streams_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analog_data.bin");
        let config = AcquisitionConfig {
            sampling_rate: 10_000.0,
            chunk_size: 10,
            ..AcquisitionConfig::default()
        };
        let mut acquisition =
            SimulatedAcquisition::new(config, EyeCalibration::default(), Span::none())
                .with_recording(&path);
        let rx = acquisition.start().unwrap();
        let chunks: Vec<_> = rx.iter().take(5).collect();
        acquisition.stop().unwrap();

        assert!(chunks.iter().all(|c| c.len() == 10));
        // jitter of 1 degree at gain 10 keeps raw gaze within 0.1 V
        assert!(chunks[0].gaze_x().iter().all(|v| v.abs() <= 0.1 + 1e-12));
        let recorded = read_recording(&path, 10).unwrap();
        assert!(recorded.len() >= 5);
        assert_eq!(&recorded[..5], &chunks[..]);
    }
}
