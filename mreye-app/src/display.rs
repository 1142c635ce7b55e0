use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use mreye_core::RenderCommand;
use mreye_experiment::DisplayConfig;
use mreye_render::{DisplayRenderer, PresentationTarget, RenderError, RenderStep};
use mreye_timing::HighPrecisionTimer;
use pixels::{Pixels, SurfaceTexture};
use tiny_skia::{Color, FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing::{Span, error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

/// A window showing composed frames, scaled down to its own size when smaller
/// than the frame.
pub struct WindowTarget {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    scaled: Option<Pixmap>,
}

impl WindowTarget {
    fn open(
        event_loop: &ActiveEventLoop,
        title: &str,
        rect: [i32; 4],
        frame_size: (u32, u32),
    ) -> Result<Self> {
        let [x, y, w, h] = rect;
        let (w, h) = (w.max(1) as u32, h.max(1) as u32);
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_position(PhysicalPosition::new(x, y))
            .with_inner_size(PhysicalSize::new(w, h))
            .with_decorations(false)
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        info!(title, width = size.width, height = size.height, "window opened");

        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let full_size = (w, h) == frame_size;
        let (buffer_w, buffer_h) = if full_size { frame_size } else { (w, h) };
        let pixels = Pixels::new(buffer_w, buffer_h, surface)
            .with_context(|| format!("creating pixel surface for {title}"))?;
        let scaled = if full_size {
            None
        } else {
            Some(Pixmap::new(w, h).context("allocating preview buffer")?)
        };

        window.set_cursor_visible(false);
        Ok(Self {
            window,
            pixels,
            scaled,
        })
    }

    fn id(&self) -> WindowId {
        self.window.id()
    }
}

impl PresentationTarget for WindowTarget {
    fn present(&mut self, frame: &Pixmap) -> Result<(), RenderError> {
        let data = match &mut self.scaled {
            None => frame.data(),
            Some(scaled) => {
                let sx = scaled.width() as f32 / frame.width() as f32;
                let sy = scaled.height() as f32 / frame.height() as f32;
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                scaled.fill(Color::BLACK);
                scaled.draw_pixmap(0, 0, frame.as_ref(), &paint, Transform::from_scale(sx, sy), None);
                scaled.data()
            }
        };
        let buffer = self.pixels.frame_mut();
        if buffer.len() != data.len() {
            return Err(RenderError::Present(anyhow::anyhow!(
                "surface buffer is {} bytes, frame is {}",
                buffer.len(),
                data.len()
            )));
        }
        buffer.copy_from_slice(data);
        self.pixels
            .render()
            .map_err(|e| RenderError::Present(e.into()))
    }
}

type WindowRenderer = DisplayRenderer<HighPrecisionTimer, Vec<WindowTarget>>;

/// Runs the renderer on the winit event loop: the subject window plus the
/// optional experimenter preview.
pub struct DisplayApp {
    config: DisplayConfig,
    commands: Option<Receiver<RenderCommand>>,
    renderer: Option<WindowRenderer>,
    span: Span,
    failure: Option<anyhow::Error>,
    /// Operator closed a window before the session finished.
    aborted: bool,
}

impl DisplayApp {
    pub fn new(config: DisplayConfig, commands: Receiver<RenderCommand>, span: Span) -> Self {
        Self {
            config,
            commands: Some(commands),
            renderer: None,
            span,
            failure: None,
            aborted: false,
        }
    }

    /// Returns `Ok(true)` when the renderer stopped on `Terminate`, `Ok(false)`
    /// when the operator closed the display first.
    pub fn run(mut self) -> Result<bool> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        Ok(!self.aborted)
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        let _entered = self.span.enter();
        let geometry = self.config.subject;
        let frame_size = (geometry.width(), geometry.height());

        let mut targets = vec![WindowTarget::open(event_loop, "mreye", geometry.rect, frame_size)?];
        if let Some(rect) = self.config.experimenter_rect {
            targets.push(WindowTarget::open(event_loop, "mreye experimenter", rect, frame_size)?);
        }
        let renderer = DisplayRenderer::new(
            &geometry,
            self.config.frame_interval(),
            commands,
            targets,
            HighPrecisionTimer::new(),
            self.span.clone(),
        )?;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn owns(&self, id: WindowId) -> bool {
        self.renderer
            .as_ref()
            .is_some_and(|r| r.target().iter().any(|t| t.id() == id))
    }

    fn abort(&mut self, event_loop: &ActiveEventLoop, reason: &str) {
        warn!(parent: &self.span, reason, "display closed before the session finished");
        self.aborted = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for DisplayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Err(e) = self.open(event_loop) {
            error!(parent: &self.span, "failed to open display: {e:#}");
            self.failure = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if !self.owns(id) {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.abort(event_loop, "window closed"),
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                self.abort(event_loop, "escape pressed")
            }
            _ => {}
        }
    }

    /// The renderer paces itself: each step waits at most one frame interval for
    /// commands before presenting.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match renderer.step() {
            Ok(RenderStep::Continue) => {}
            Ok(RenderStep::Stopped) => event_loop.exit(),
            Err(e) => {
                self.failure = Some(anyhow::Error::new(e).context("display renderer failed"));
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Windows and surfaces go before the event loop does.
        if let Some(renderer) = self.renderer.take() {
            let stats = renderer.frame_stats();
            info!(parent: &self.span, fps = stats.effective_fps, "display released");
        }
    }
}
