use bytemuck::{cast_slice, cast_slice_mut};
use tiny_skia::{Color, FillRule, IntSize, Paint, PathBuilder, Pixmap, Transform};

use crate::error::RenderError;

/// Opaque black offscreen frame that stimuli are blitted onto, premultiplied RGBA.
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::FrameSize { width, height })?;
        pixmap.fill(Color::BLACK);
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self) {
        self.pixmap.fill(Color::BLACK);
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// RGBA bytes, row-major. Every pixel is opaque, so these are also the
    /// straight-alpha values a window surface expects.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let p = self.pixmap.pixel(x, y)?;
        Some([p.red(), p.green(), p.blue(), p.alpha()])
    }

    /// Draws `sprite` with its centre at `pos`, clipped to the canvas.
    pub fn blit(&mut self, sprite: &Pixmap, pos: (f32, f32)) {
        if !(pos.0.is_finite() && pos.1.is_finite()) {
            return;
        }
        // i64 so a far off-screen origin cannot overflow the cull arithmetic
        let (w, h) = (i64::from(sprite.width()), i64::from(sprite.height()));
        let (cw, ch) = (i64::from(self.width()), i64::from(self.height()));
        let x0 = (f64::from(pos.0) - w as f64 * 0.5).floor() as i64;
        let y0 = (f64::from(pos.1) - h as f64 * 0.5).floor() as i64;

        // Cull fully off-screen
        if x0.saturating_add(w) <= 0 || y0.saturating_add(h) <= 0 || x0 >= cw || y0 >= ch {
            return;
        }

        let dst_x = x0.max(0) as usize;
        let dst_y = y0.max(0) as usize;
        let src_x = (-x0).max(0) as usize;
        let src_y = (-y0).max(0) as usize;
        let copy_w = (w as usize - src_x).min(cw as usize - dst_x);
        let copy_h = (h as usize - src_y).min(ch as usize - dst_y);

        let src_stride = w as usize;
        let dst_stride = cw as usize;
        let src: &[u32] = cast_slice(sprite.data());
        let dst: &mut [u32] = cast_slice_mut(self.pixmap.data_mut());

        let opaque = (0..copy_h).all(|row| {
            let start = (src_y + row) * src_stride + src_x;
            src[start..start + copy_w].iter().all(|&p| p >> 24 == 0xFF)
        });

        for row in 0..copy_h {
            let s = (src_y + row) * src_stride + src_x;
            let d = (dst_y + row) * dst_stride + dst_x;
            if opaque {
                dst[d..d + copy_w].copy_from_slice(&src[s..s + copy_w]);
            } else {
                for (dp, &sp) in dst[d..d + copy_w].iter_mut().zip(&src[s..s + copy_w]) {
                    *dp = blend_over(sp, *dp);
                }
            }
        }
    }
}

/// Porter-Duff over on premultiplied little-endian RGBA words.
fn blend_over(src: u32, dst: u32) -> u32 {
    let inv = 255 - (src >> 24);
    let channel = |shift: u32| {
        let s = (src >> shift) & 0xFF;
        let d = (dst >> shift) & 0xFF;
        (s + (d * inv + 127) / 255).min(255) << shift
    };
    channel(0) | channel(8) | channel(16) | channel(24)
}

/// Filled disc of `radius` pixels, `color` in RGB.
pub fn circle_sprite(radius: f32, color: [u8; 3]) -> Result<Pixmap, RenderError> {
    let size = (radius * 2.0).ceil().max(1.0) as u32;
    let mut pixmap = Pixmap::new(size, size).ok_or(RenderError::FrameSize {
        width: size,
        height: size,
    })?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(color[0], color[1], color[2], 255));

    let center = size as f32 * 0.5;
    let mut pb = PathBuilder::new();
    pb.push_circle(center, center, radius.max(0.5));
    if let Some(path) = pb.finish() {
        pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }
    Ok(pixmap)
}

/// Converts straight-alpha RGBA8 (as decoded from an image file) into a
/// premultiplied pixmap.
pub fn pixmap_from_rgba(width: u32, height: u32, mut rgba: Vec<u8>) -> Result<Pixmap, RenderError> {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a != 255 {
            for c in &mut px[..3] {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
    }
    IntSize::from_wh(width, height)
        .and_then(|size| Pixmap::from_vec(rgba, size))
        .ok_or(RenderError::FrameSize { width, height })
}
