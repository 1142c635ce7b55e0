use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use mreye_timing::Timer;

/// Entries of the experimental record.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    BlockStart { name: String },
    TriggerLow,
    TriggerHigh,
    /// Criterion met and a reward requested; the cycle was fixated
    /// `percent_fixated` percent of the time. Logged even when the pulse was
    /// dropped or the output is unavailable.
    Reward { percent_fixated: f64 },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::BlockStart { name } => write!(f, "BLOCK_START {name}"),
            SessionEvent::TriggerLow => f.write_str("TR_LOW"),
            SessionEvent::TriggerHigh => f.write_str("TR_HIGH"),
            SessionEvent::Reward { percent_fixated } => write!(f, "REWARD {percent_fixated:.2}"),
        }
    }
}

/// Append-only, line-per-event record timestamped relative to session start.
pub struct EventLog<W: Write, T: Timer> {
    writer: BufWriter<W>,
    timer: T,
    written: usize,
}

impl<T: Timer> EventLog<File, T> {
    pub fn create(path: &Path, timer: T) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file, timer))
    }
}

impl<W: Write, T: Timer> EventLog<W, T> {
    pub fn new(writer: W, timer: T) -> Self {
        Self {
            writer: BufWriter::new(writer),
            timer,
            written: 0,
        }
    }

    /// Writes one line and flushes it.
    pub fn append(&mut self, event: &SessionEvent) -> io::Result<()> {
        let elapsed = self.timer.since_start().as_secs_f64();
        writeln!(self.writer, "{event} {elapsed:.6}")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mreye_timing::ManualTimer;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn lines_carry_arguments_then_elapsed_seconds() {
        let timer = ManualTimer::new();
        let mut log = EventLog::new(Vec::new(), timer.clone());

        timer.set(Duration::from_millis(1500));
        log.append(&SessionEvent::BlockStart {
            name: "task".into(),
        })
        .unwrap();
        timer.advance(Duration::from_micros(250));
        log.append(&SessionEvent::TriggerLow).unwrap();
        log.append(&SessionEvent::Reward {
            percent_fixated: 90.0,
        })
        .unwrap();
        timer.advance(Duration::from_secs(1));
        log.append(&SessionEvent::TriggerHigh).unwrap();
        assert_eq!(log.len(), 4);

        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "BLOCK_START task 1.500000\n\
             TR_LOW 1.500250\n\
             REWARD 90.00 1.500250\n\
             TR_HIGH 2.500250\n"
        );
    }

    #[test]
    fn file_log_appends_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        for _ in 0..2 {
            let mut log = EventLog::create(&path, ManualTimer::new()).unwrap();
            log.append(&SessionEvent::TriggerLow).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|l| l == "TR_LOW 0.000000"));
    }
}
