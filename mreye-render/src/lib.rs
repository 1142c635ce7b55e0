pub mod canvas;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod source;
pub mod target;

pub use canvas::Canvas;
pub use error::RenderError;
pub use renderer::{DisplayRenderer, RenderStep};
pub use scene::{FrameAdvance, Projection, RenderObject, Scene};
pub use source::{
    DirectoryLoader, FrameSequence, FrameSource, ImageSequenceSource, MemoryLoader, SourceLoader,
};
pub use target::{MemoryTarget, PresentationTarget};
