//! Frame sources for video stimuli.
//!
//! A source yields decoded frames one at a time. Skipped frames are never
//! decoded, so a renderer that falls behind catches up cheaply.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiny_skia::Pixmap;
use tracing::debug;

use crate::canvas::pixmap_from_rgba;
use crate::error::RenderError;

pub const DEFAULT_FPS: f64 = 30.0;

pub trait FrameSource: Send {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Arc<Pixmap>>, RenderError>;

    /// Moves past up to `n` frames without decoding them; returns how many were
    /// skipped.
    fn skip(&mut self, n: usize) -> usize;

    /// Restarts from the first frame.
    fn rewind(&mut self);

    /// Native frame rate, if the source knows it.
    fn fps(&self) -> Option<f64> {
        None
    }
}

/// Opens the source a Video stimulus names.
pub trait SourceLoader {
    fn open(&mut self, path: &str) -> Result<Box<dyn FrameSource>, RenderError>;
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Still images in a directory, played in file-name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self, RenderError> {
        let open_err = |reason: String| RenderError::SourceOpen {
            path: dir.to_path_buf(),
            reason,
        };
        let entries = fs::read_dir(dir).map_err(|e| open_err(e.to_string()))?;
        let mut frames = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| open_err(e.to_string()))?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(RenderError::EmptySource {
                path: dir.to_path_buf(),
            });
        }
        frames.sort();
        debug!(dir = %dir.display(), frames = frames.len(), "image sequence opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            frames,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Arc<Pixmap>>, RenderError> {
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        let image = image::open(path)
            .map_err(|source| RenderError::Decode {
                path: path.clone(),
                source,
            })?
            .into_rgba8();
        let (width, height) = image.dimensions();
        Ok(Some(Arc::new(pixmap_from_rgba(width, height, image.into_raw())?)))
    }

    fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.frames.len() - self.cursor);
        self.cursor += skipped;
        skipped
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Resolves Video paths as image directories, relative to `root`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceLoader for DirectoryLoader {
    fn open(&mut self, path: &str) -> Result<Box<dyn FrameSource>, RenderError> {
        Ok(Box::new(ImageSequenceSource::open(&self.root.join(path))?))
    }
}

/// Pre-decoded frames held in memory.
#[derive(Clone)]
pub struct FrameSequence {
    frames: Vec<Arc<Pixmap>>,
    cursor: usize,
    fps: Option<f64>,
}

impl FrameSequence {
    pub fn new(frames: Vec<Arc<Pixmap>>) -> Self {
        Self {
            frames,
            cursor: 0,
            fps: None,
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }
}

impl FrameSource for FrameSequence {
    fn next_frame(&mut self) -> Result<Option<Arc<Pixmap>>, RenderError> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.frames.len() - self.cursor);
        self.cursor += skipped;
        skipped
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Loader that hands out clones of registered in-memory sequences by name.
#[derive(Clone, Default)]
pub struct MemoryLoader {
    sources: Vec<(String, FrameSequence)>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: impl Into<String>, source: FrameSequence) -> Self {
        self.sources.push((name.into(), source));
        self
    }
}

impl SourceLoader for MemoryLoader {
    fn open(&mut self, path: &str) -> Result<Box<dyn FrameSource>, RenderError> {
        self.sources
            .iter()
            .find(|(name, _)| name == path)
            .map(|(_, source)| Box::new(source.clone()) as Box<dyn FrameSource>)
            .ok_or_else(|| RenderError::SourceOpen {
                path: PathBuf::from(path),
                reason: "no such source".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            let shade = (i * 100) as u8;
            RgbaImage::from_pixel(3, 2, Rgba([shade, 0, 0, 255]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn image_directory_plays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["001.png", "000.png", "002.png"]);
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        // 000.png was written second, so it carries the second shade
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (3, 2));
        assert_eq!(first.pixel(0, 0).unwrap().red(), 100);

        assert_eq!(source.skip(5), 2);
        assert!(source.next_frame().unwrap().is_none());
        source.rewind();
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn directory_without_images_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(RenderError::EmptySource { .. })
        ));
        assert!(matches!(
            DirectoryLoader::new(dir.path()).open("missing"),
            Err(RenderError::SourceOpen { .. })
        ));
    }

    #[test]
    fn memory_loader_clones_sources() {
        let frame = Arc::new(Pixmap::new(1, 1).unwrap());
        let mut loader =
            MemoryLoader::new().with_source("clip", FrameSequence::new(vec![frame; 2]));
        let mut a = loader.open("clip").unwrap();
        a.skip(2);
        assert!(a.next_frame().unwrap().is_none());
        let mut b = loader.open("clip").unwrap();
        assert!(b.next_frame().unwrap().is_some());
    }
}
