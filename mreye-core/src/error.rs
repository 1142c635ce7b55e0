use thiserror::Error;

/// Malformed block, stimulus or session settings. Always fatal: they are reported before
/// the session starts, or stop the activity that first meets them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized stimulus kind")]
    UnknownStimulusKind,
    #[error("block `{0}` has a trigger target of 0")]
    ZeroTriggerTarget(String),
    #[error("fixation proportion {0} is outside [0, 1]")]
    InvalidProportion(f64),
    #[error("radius {0} must be non-negative")]
    InvalidRadius(f64),
    #[error("frame rate {0} must be positive")]
    InvalidFrameRate(f64),
    #[error("`{setting}` is {value}, expected {expected}")]
    InvalidSetting {
        setting: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("block `{block}`: {source}")]
    InBlock {
        block: String,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("sample chunk channels differ in length: {gaze_x}/{gaze_y}/{trigger}")]
    ChunkShape {
        gaze_x: usize,
        gaze_y: usize,
        trigger: usize,
    },
}
