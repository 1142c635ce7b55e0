use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Everything one run writes, under a single directory.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    /// Creates `name`, or a directory named by the current local time. An existing
    /// directory is an error so no session overwrites another.
    pub fn create(name: Option<PathBuf>) -> Result<Self> {
        let root = name.unwrap_or_else(|| {
            PathBuf::from(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
        });
        fs::create_dir(&root)
            .with_context(|| format!("creating session directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn analog_data(&self) -> PathBuf {
        self.root.join("analog_data.bin")
    }

    pub fn experiment_log(&self) -> PathBuf {
        self.root.join("experiment.log")
    }

    pub fn event_log(&self) -> PathBuf {
        self.root.join("data.txt")
    }

    pub fn sequence(&self) -> PathBuf {
        self.root.join("sequence.json")
    }
}

/// Diagnostics for one session: stdout at INFO (DEBUG when verbose, `RUST_LOG`
/// wins over both) and everything from DEBUG up in `experiment.log`.
pub fn session_dispatch(log_path: &Path, verbose: bool) -> Result<Dispatch> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;
    Ok(Dispatch::new(
        tracing_subscriber::registry()
            .with(stdout_layer(verbose))
            .with(file_layer(file)),
    ))
}

fn stdout_layer<S>(verbose: bool) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt::layer()
        .compact()
        .with_target(false)
        .with_filter(filter)
}

fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test]
    fn creates_named_directory_once() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("s01");
        let session = SessionDir::create(Some(name.clone())).unwrap();
        assert!(session.root().is_dir());
        assert_eq!(session.event_log(), name.join("data.txt"));
        assert!(SessionDir::create(Some(name)).is_err());
    }

    #[test]
    fn dispatch_writes_to_the_session_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.log");
        let dispatch = session_dispatch(&path, false).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            let span = tracing::info_span!("orchestrator");
            span.in_scope(|| info!("block started"));
        });
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("block started"));
        assert!(text.contains("orchestrator"));
    }
}
