pub mod block;
pub mod command;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod sample;
pub mod stimulus;

pub use block::{Block, FixationCriterion};
pub use command::RenderCommand;
pub use error::ConfigError;
pub use geometry::ScreenGeometry;
pub use sample::{AnalogSampleChunk, CHANNELS, Channel};
pub use stimulus::StimulusSpec;
