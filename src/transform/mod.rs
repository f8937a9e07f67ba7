//! Plate-to-pixel transforms.
//!
//! The identification engine only needs one thing from the optical model:
//! where a known plate position (mm) lands on the camera (pixels). That seam
//! is the [`PlateToPixel`] trait. Any `Fn(f64, f64) -> (f64, f64)` closure
//! implements it, so callers with their own model can plug it in directly.
//!
//! # Supported models
//!
//! - [`PlateTransform::Identity`]: plate units are pixels (synthetic data, tests)
//! - [`PlateTransform::Affine`]: scale, rotation and offset
//! - [`PlateTransform::Polynomial`]: 2D polynomial pixel→plate model, inverted numerically
//!
//! Models are stored as JSON, tagged by a `"model"` field, and read with
//! [`load_transform`].

pub mod affine;
pub mod polynomial;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use affine::AffineTransform;
pub use polynomial::PolynomialTransform;

/// Maps physical plate coordinates to camera pixel coordinates.
pub trait PlateToPixel {
    fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64);
}

impl<F> PlateToPixel for F
where
    F: Fn(f64, f64) -> (f64, f64),
{
    fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        self(x_fp, y_fp)
    }
}

/// A serializable plate-to-pixel model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum PlateTransform {
    /// Plate coordinates are already pixels.
    #[default]
    Identity,
    Affine(AffineTransform),
    Polynomial(PolynomialTransform),
}

impl PlateTransform {
    /// Parse a model from its JSON text, validating it.
    pub fn from_json(text: &str) -> Result<Self> {
        let model: PlateTransform =
            serde_json::from_str(text).context("parsing plate transform JSON")?;
        if let PlateTransform::Polynomial(p) = &model {
            p.validate()?;
        }
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Inverse mapping, camera pixels to plate coordinates.
    pub fn pixel_to_plate(&self, x_pix: f64, y_pix: f64) -> (f64, f64) {
        match self {
            PlateTransform::Identity => (x_pix, y_pix),
            PlateTransform::Affine(a) => a.pixel_to_plate(x_pix, y_pix),
            PlateTransform::Polynomial(p) => p.pixel_to_plate(x_pix, y_pix),
        }
    }
}

impl PlateToPixel for AffineTransform {
    fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        AffineTransform::plate_to_pixel(self, x_fp, y_fp)
    }
}

impl PlateToPixel for PolynomialTransform {
    fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        PolynomialTransform::plate_to_pixel(self, x_fp, y_fp)
    }
}

impl PlateToPixel for PlateTransform {
    fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        match self {
            PlateTransform::Identity => (x_fp, y_fp),
            PlateTransform::Affine(a) => a.plate_to_pixel(x_fp, y_fp),
            PlateTransform::Polynomial(p) => p.plate_to_pixel(x_fp, y_fp),
        }
    }
}

/// Load a plate transform from a JSON file.
pub fn load_transform<P: AsRef<Path>>(path: P) -> Result<PlateTransform> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read transform file {}", path.display()))?;
    PlateTransform::from_json(&text).with_context(|| format!("in transform file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_transforms() {
        let shift = |x: f64, y: f64| (x + 100.0, y + 50.0);
        assert_eq!(shift.plate_to_pixel(1.0, 2.0), (101.0, 52.0));
    }

    #[test]
    fn parses_tagged_models() {
        let t = PlateTransform::from_json(r#"{"model": "identity"}"#).unwrap();
        assert_eq!(t, PlateTransform::Identity);

        let t = PlateTransform::from_json(
            r#"{"model": "affine", "scale": 2.0, "rotation_deg": 0.0, "x_offset": 10.0, "y_offset": -5.0}"#,
        )
        .unwrap();
        assert_eq!(t.plate_to_pixel(1.0, 1.0), (12.0, -3.0));
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(PlateTransform::from_json(r#"{"model": "zernike"}"#).is_err());
    }

    #[test]
    fn json_roundtrip_preserves_model() {
        let t = PlateTransform::Affine(AffineTransform::new(3.1, 12.0, 2999.0, 3001.5));
        let back = PlateTransform::from_json(&t.to_json().unwrap()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_transform("/nonexistent/fvc2fp.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fvc2fp.json"));
    }
}
