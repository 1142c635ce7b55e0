use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// A stimulus the renderer cannot draw. The block definition is malformed,
    /// so the renderer stops.
    #[error("unknown stimulus kind in block definition")]
    UnknownStimulusKind,
    #[error("cannot open frame source {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },
    #[error("frame source {path} has no frames")]
    EmptySource { path: PathBuf },
    #[error("decoding {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame of {width}x{height} cannot be drawn")]
    FrameSize { width: u32, height: u32 },
    #[error("presenting frame")]
    Present(#[source] anyhow::Error),
}

impl RenderError {
    /// Whether the render loop must stop rather than skip the offending command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::UnknownStimulusKind | RenderError::Present(_))
    }
}
