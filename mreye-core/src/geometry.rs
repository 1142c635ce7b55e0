use serde::{Deserialize, Serialize};

/// Physical layout of a display, used to convert degrees of visual angle into
/// pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenGeometry {
    /// Window rectangle `[x, y, width, height]` in desktop pixels.
    pub rect: [i32; 4],
    pub distance_cm: f64,
    pub diagonal_cm: f64,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            rect: [1920, 0, 1920, 1080],
            distance_cm: 119.0,
            diagonal_cm: 38.4,
        }
    }
}

impl ScreenGeometry {
    pub fn width(&self) -> u32 {
        self.rect[2].max(1) as u32
    }

    pub fn height(&self) -> u32 {
        self.rect[3].max(1) as u32
    }

    pub fn position(&self) -> (i32, i32) {
        (self.rect[0], self.rect[1])
    }

    /// Pixel diagonal divided by the visual angle subtended by the screen diagonal.
    pub fn pixels_per_degree(&self) -> f64 {
        let w = self.width() as f64;
        let h = self.height() as f64;
        let screen_angle = 2.0 * ((self.diagonal_cm / 2.0) / self.distance_cm).atan();
        (w * w + h * h).sqrt() / screen_angle.to_degrees()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.width() / 2) as f64, (self.height() / 2) as f64)
    }
}
