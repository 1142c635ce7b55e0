use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use mreye_core::{RenderCommand, ScreenGeometry};
use mreye_timing::{FrameTimingStats, Timer};
use tracing::{Span, debug, error, info, warn};

use crate::canvas::Canvas;
use crate::error::RenderError;
use crate::scene::{Projection, Scene};
use crate::source::{DirectoryLoader, SourceLoader};
use crate::target::PresentationTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    Continue,
    /// `Terminate` arrived or the command channel closed.
    Stopped,
}

/// Owns the scene and turns render commands into presented frames at a steady
/// cadence. Nothing outside the renderer touches the scene.
pub struct DisplayRenderer<T: Timer, P: PresentationTarget> {
    commands: Receiver<RenderCommand>,
    scene: Scene,
    canvas: Canvas,
    loader: Box<dyn SourceLoader>,
    target: P,
    timer: T,
    frame_interval: Duration,
    last_frame_ns: Option<u64>,
    dropped_frames: usize,
    stopped: bool,
    span: Span,
}

impl<T: Timer, P: PresentationTarget> DisplayRenderer<T, P> {
    pub fn new(
        geometry: &ScreenGeometry,
        frame_interval: Duration,
        commands: Receiver<RenderCommand>,
        target: P,
        timer: T,
        span: Span,
    ) -> Result<Self, RenderError> {
        Ok(Self {
            commands,
            scene: Scene::new(Projection::new(geometry)),
            canvas: Canvas::new(geometry.width(), geometry.height())?,
            loader: Box::new(DirectoryLoader::new(".")),
            target,
            timer,
            frame_interval,
            last_frame_ns: None,
            dropped_frames: 0,
            stopped: false,
            span,
        })
    }

    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn target(&self) -> &P {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut P {
        &mut self.target
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn frame_stats(&self) -> FrameTimingStats {
        self.timer.frame_stats()
    }

    /// One iteration: wait at most one frame interval for a command, apply it and
    /// everything else already queued, then present a frame.
    pub fn step(&mut self) -> Result<RenderStep, RenderError> {
        if self.stopped {
            return Ok(RenderStep::Stopped);
        }
        let span = self.span.clone();
        let _entered = span.enter();

        let mut batch = Vec::new();
        match self.commands.recv_timeout(self.frame_interval) {
            Ok(command) => batch.push(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("command channel closed without Terminate, stopping");
                return Ok(self.stop());
            }
        }
        batch.extend(self.commands.try_iter());

        for command in batch {
            if self.apply(command)? == RenderStep::Stopped {
                return Ok(RenderStep::Stopped);
            }
        }
        self.render_frame()?;
        Ok(RenderStep::Continue)
    }

    /// Steps until stopped. A fatal error stops the loop and is returned.
    pub fn run(&mut self) -> Result<(), RenderError> {
        while self.step()? == RenderStep::Continue {}
        Ok(())
    }

    pub fn apply(&mut self, command: RenderCommand) -> Result<RenderStep, RenderError> {
        match command {
            RenderCommand::AddObjects(specs) => {
                for spec in &specs {
                    match self.scene.add(spec, self.loader.as_mut()) {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            error!("stopping renderer: {e}");
                            self.stop();
                            return Err(e);
                        }
                        Err(e) => error!(kind = spec.kind(), "stimulus skipped: {e}"),
                    }
                }
            }
            RenderCommand::Clear => self.scene.clear(),
            RenderCommand::Terminate => {
                info!("terminate received");
                return Ok(self.stop());
            }
        }
        Ok(RenderStep::Continue)
    }

    fn render_frame(&mut self) -> Result<(), RenderError> {
        let now = self.timer.now();
        let dt = match self.last_frame_ns.replace(now) {
            Some(last) => Duration::from_nanos(now.saturating_sub(last)),
            None => Duration::ZERO,
        };
        if !dt.is_zero() {
            self.timer.record_frame(dt);
        }

        let advance = self.scene.advance(dt);
        self.dropped_frames += advance.dropped_frames;
        self.scene.compose(&mut self.canvas);
        if let Err(e) = self.target.present(self.canvas.pixmap()) {
            error!("presentation failed: {e}");
            self.stop();
            return Err(e);
        }
        Ok(())
    }

    fn stop(&mut self) -> RenderStep {
        if !self.stopped {
            self.stopped = true;
            self.scene.clear();
            let stats = self.timer.frame_stats();
            info!(
                frames = self.timer.frame_count(),
                avg_ms = stats.average_frame_time_ns / 1e6,
                jitter_ms = stats.jitter_ns / 1e6,
                min_ms = stats.min_frame_time_ns / 1e6,
                max_ms = stats.max_frame_time_ns / 1e6,
                fps = stats.effective_fps,
                dropped_video_frames = self.dropped_frames,
                "renderer stopped"
            );
        } else {
            debug!("renderer already stopped");
        }
        RenderStep::Stopped
    }
}
