use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Trait for the clocks driving the session: event timestamps, frame pacing and
/// video playback all read time through it.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the timer was created.
    fn now(&self) -> u64;
    fn elapsed(&self, since: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(since))
    }
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_stats(&self) -> FrameTimingStats;
    fn frame_count(&self) -> usize;

    fn since_start(&self) -> Duration {
        Duration::from_nanos(self.now())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameTimingStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

/// Bounded history of frame durations.
#[derive(Debug, Clone)]
pub struct FrameTimes {
    times: VecDeque<Duration>,
    max_samples: usize,
}

impl FrameTimes {
    pub fn new(max_samples: usize) -> Self {
        Self {
            times: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, d: Duration) {
        if self.times.len() >= self.max_samples {
            self.times.pop_front();
        }
        self.times.push_back(d);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn stats(&self) -> FrameTimingStats {
        if self.times.is_empty() {
            return FrameTimingStats::default();
        }
        let times: Vec<f64> = self.times.iter().map(|d| d.as_nanos() as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        FrameTimingStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl Default for FrameTimes {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Monotonic wall clock with sub-millisecond sleeps where the platform allows.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frames: FrameTimes,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        self.frames.record(d);
    }
    fn frame_stats(&self) -> FrameTimingStats {
        self.frames.stats()
    }
    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frames: FrameTimes::default(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // SAFETY: `req` outlives the call and a null remainder pointer is allowed.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock that only moves when told to. Clones share the same time, so a test can
/// hold one handle and advance the clock seen by the component under test.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    frames: FrameTimes,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, since_start: Duration) {
        self.now_ns
            .store(since_start.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    /// Sleeping advances the shared clock instead of blocking.
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        self.frames.record(d);
    }
    fn frame_stats(&self) -> FrameTimingStats {
        self.frames.stats()
    }
    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}
