//! Where composed frames go.

use tiny_skia::Pixmap;

use crate::error::RenderError;

/// A surface that shows composed frames. Scaling to the surface size is the
/// target's job.
pub trait PresentationTarget {
    fn present(&mut self, frame: &Pixmap) -> Result<(), RenderError>;
}

impl<T: PresentationTarget + ?Sized> PresentationTarget for Box<T> {
    fn present(&mut self, frame: &Pixmap) -> Result<(), RenderError> {
        (**self).present(frame)
    }
}

/// Fan-out: every target gets the same frame, in order.
impl<T: PresentationTarget> PresentationTarget for Vec<T> {
    fn present(&mut self, frame: &Pixmap) -> Result<(), RenderError> {
        self.iter_mut().try_for_each(|target| target.present(frame))
    }
}

/// Keeps the most recent frame; used headless and in tests.
#[derive(Default)]
pub struct MemoryTarget {
    last: Option<Pixmap>,
    presented: u64,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&Pixmap> {
        self.last.as_ref()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl PresentationTarget for MemoryTarget {
    fn present(&mut self, frame: &Pixmap) -> Result<(), RenderError> {
        let same_size = |last: &Pixmap| last.width() == frame.width() && last.height() == frame.height();
        match self.last.as_mut() {
            Some(last) if same_size(last) => last.data_mut().copy_from_slice(frame.data()),
            _ => self.last = Some(frame.clone()),
        }
        self.presented += 1;
        Ok(())
    }
}
