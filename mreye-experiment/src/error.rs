use std::io;
use std::path::PathBuf;

use mreye_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("event log write failed: {0}")]
    EventLog(#[source] io::Error),
    #[error("acquisition stopped delivering samples")]
    AcquisitionLost,
    #[error("acquisition fault: {0}")]
    Acquisition(#[source] anyhow::Error),
    #[error("display renderer is no longer accepting commands")]
    RendererDisconnected,
}
