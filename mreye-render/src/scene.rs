//! What is on screen: stimuli resolved to pixel space plus video playback state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mreye_core::{ScreenGeometry, StimulusSpec};
use tiny_skia::Pixmap;
use tracing::{debug, error, info, warn};

use crate::canvas::{Canvas, circle_sprite};
use crate::error::RenderError;
use crate::source::{DEFAULT_FPS, FrameSource, SourceLoader};

/// Maps visual-angle offsets from screen centre to pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub pixels_per_degree: f64,
    pub center: (f64, f64),
}

impl Projection {
    pub fn new(geometry: &ScreenGeometry) -> Self {
        Self {
            pixels_per_degree: geometry.pixels_per_degree(),
            center: geometry.center(),
        }
    }

    pub fn to_pixels(&self, x_deg: f64, y_deg: f64) -> (f32, f32) {
        (
            (x_deg * self.pixels_per_degree + self.center.0) as f32,
            (y_deg * self.pixels_per_degree + self.center.1) as f32,
        )
    }

    pub fn length(&self, deg: f64) -> f32 {
        (deg * self.pixels_per_degree) as f32
    }
}

pub struct VideoPlayback {
    source: Box<dyn FrameSource>,
    frame: Arc<Pixmap>,
    elapsed_s: f64,
    frame_interval_s: f64,
    looping: bool,
    path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    /// Still playing; `dropped` frames were skipped to catch up.
    Playing { dropped: usize },
    Finished,
}

impl VideoPlayback {
    fn advance(&mut self, dt: Duration) -> Result<Playback, RenderError> {
        self.elapsed_s += dt.as_secs_f64();
        let frames_passed = (self.elapsed_s / self.frame_interval_s).floor();
        if frames_passed < 1.0 {
            return Ok(Playback::Playing { dropped: 0 });
        }
        self.elapsed_s -= frames_passed * self.frame_interval_s;

        let frames_passed = frames_passed as usize;
        let dropped = if frames_passed > 1 {
            self.source.skip(frames_passed - 1)
        } else {
            0
        };

        let next = match self.source.next_frame()? {
            Some(frame) => Some(frame),
            None if self.looping => {
                self.source.rewind();
                self.source.next_frame()?
            }
            None => None,
        };
        Ok(match next {
            Some(frame) => {
                self.frame = frame;
                Playback::Playing { dropped }
            }
            None => Playback::Finished,
        })
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(self.frame_interval_s)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub enum ObjectKind {
    Circle { sprite: Arc<Pixmap> },
    Video(VideoPlayback),
}

/// A stimulus resolved to pixel coordinates.
pub struct RenderObject {
    pub z: i32,
    /// Centre, in pixels.
    pub position: (f32, f32),
    pub kind: ObjectKind,
}

impl RenderObject {
    fn sprite(&self) -> &Pixmap {
        match &self.kind {
            ObjectKind::Circle { sprite } => sprite,
            ObjectKind::Video(video) => &video.frame,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, ObjectKind::Video(_))
    }
}

/// Outcome of advancing every video by one frame period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameAdvance {
    pub dropped_frames: usize,
    pub removed: usize,
}

pub struct Scene {
    projection: Projection,
    objects: Vec<RenderObject>,
    sprites: HashMap<(u32, [u8; 3]), Arc<Pixmap>>,
}

impl Scene {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            objects: Vec::new(),
            sprites: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Resolves `spec` to pixel space and adds it. Video sources are opened and
    /// their first frame decoded here.
    pub fn add(
        &mut self,
        spec: &StimulusSpec,
        loader: &mut dyn SourceLoader,
    ) -> Result<(), RenderError> {
        let object = match spec {
            StimulusSpec::Circle {
                x,
                y,
                radius,
                color,
                z,
            } => {
                let radius_px = self.projection.length(*radius);
                let key = (radius_px.to_bits(), *color);
                let sprite = match self.sprites.get(&key) {
                    Some(sprite) => Arc::clone(sprite),
                    None => {
                        let sprite = Arc::new(circle_sprite(radius_px, *color)?);
                        self.sprites.insert(key, Arc::clone(&sprite));
                        sprite
                    }
                };
                RenderObject {
                    z: *z,
                    position: self.projection.to_pixels(*x, *y),
                    kind: ObjectKind::Circle { sprite },
                }
            }
            StimulusSpec::Video {
                path,
                x,
                y,
                z,
                looping,
                fps,
            } => {
                let mut source = loader.open(path)?;
                let frame = source.next_frame()?.ok_or_else(|| RenderError::EmptySource {
                    path: PathBuf::from(path),
                })?;
                let fps = fps.or_else(|| source.fps()).unwrap_or(DEFAULT_FPS);
                info!(%path, fps, looping, "video added");
                RenderObject {
                    z: *z,
                    position: self.projection.to_pixels(*x, *y),
                    kind: ObjectKind::Video(VideoPlayback {
                        source,
                        frame,
                        elapsed_s: 0.0,
                        frame_interval_s: 1.0 / fps,
                        looping: *looping,
                        path: path.clone(),
                    }),
                }
            }
            StimulusSpec::Unsupported => return Err(RenderError::UnknownStimulusKind),
        };
        debug!(kind = spec.kind(), z = object.z, "object added");
        self.objects.push(object);
        Ok(())
    }

    pub fn clear(&mut self) {
        debug!(objects = self.objects.len(), "scene cleared");
        self.objects.clear();
    }

    /// Moves every video on by `dt` of wall-clock time and removes the ones that
    /// ran out. Removal happens after the pass over the scene.
    pub fn advance(&mut self, dt: Duration) -> FrameAdvance {
        let mut report = FrameAdvance::default();
        let mut finished = Vec::new();

        for (index, object) in self.objects.iter_mut().enumerate() {
            let ObjectKind::Video(video) = &mut object.kind else {
                continue;
            };
            match video.advance(dt) {
                Ok(Playback::Playing { dropped: 0 }) => {}
                Ok(Playback::Playing { dropped }) => {
                    warn!(path = video.path(), dropped, "dropped video frames");
                    report.dropped_frames += dropped;
                }
                Ok(Playback::Finished) => {
                    debug!(path = video.path(), "video finished");
                    finished.push(index);
                }
                Err(e) => {
                    error!(path = video.path(), "video playback failed: {e}");
                    finished.push(index);
                }
            }
        }

        report.removed = finished.len();
        for index in finished.into_iter().rev() {
            self.objects.remove(index);
        }
        report
    }

    /// Indices into [`Scene::objects`] in drawing order: ascending `z`, ties in
    /// insertion order.
    pub fn draw_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.objects.len()).collect();
        order.sort_by_key(|&i| self.objects[i].z);
        order
    }

    pub fn compose(&self, canvas: &mut Canvas) {
        canvas.clear();
        for index in self.draw_order() {
            let object = &self.objects[index];
            canvas.blit(object.sprite(), object.position);
        }
    }
}
