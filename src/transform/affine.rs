//! Similarity transform: uniform scale, rotation, then offset.
//!
//! ```text
//! pix = scale · R(rotation) · fp + offset
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Pixels per plate unit.
    pub scale: f64,
    /// Counter-clockwise rotation from plate to pixel axes, in degrees.
    #[serde(default)]
    pub rotation_deg: f64,
    #[serde(default)]
    pub x_offset: f64,
    #[serde(default)]
    pub y_offset: f64,
}

impl AffineTransform {
    pub fn new(scale: f64, rotation_deg: f64, x_offset: f64, y_offset: f64) -> Self {
        Self {
            scale,
            rotation_deg,
            x_offset,
            y_offset,
        }
    }

    pub fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        let (s, c) = self.rotation_deg.to_radians().sin_cos();
        (
            self.scale * (c * x_fp - s * y_fp) + self.x_offset,
            self.scale * (s * x_fp + c * y_fp) + self.y_offset,
        )
    }

    pub fn pixel_to_plate(&self, x_pix: f64, y_pix: f64) -> (f64, f64) {
        let (s, c) = self.rotation_deg.to_radians().sin_cos();
        let x = (x_pix - self.x_offset) / self.scale;
        let y = (y_pix - self.y_offset) / self.scale;
        (c * x + s * y, -s * x + c * y)
    }
}
