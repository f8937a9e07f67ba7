//! Polynomial camera model.
//!
//! The model is fitted in the camera-to-plate direction, as a 2D polynomial
//! in normalized pixel coordinates:
//!
//! ```text
//! u = (x_pix - x_offset) / scale
//! v = (y_pix - y_offset) / scale
//! x_fp = Σ XC_pq · u^p · v^q      (0 ≤ p+q ≤ degree)
//! y_fp = Σ YC_pq · u^p · v^q
//! ```
//!
//! Terms are ordered by increasing total degree, then decreasing power of `u`:
//! `1, u, v, u², uv, v², u³, …`.
//!
//! The plate-to-pixel direction, which is what fiducial matching needs, has
//! no closed form and is computed by Newton-Raphson iteration on the 2×2
//! Jacobian, seeded from the linear part of the model.

use anyhow::{bail, Result};
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

const MAX_NEWTON_ITERATIONS: usize = 20;
const NEWTON_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialTransform {
    pub degree: u32,
    /// Pixel coordinate mapped to u = 0.
    pub x_offset: f64,
    /// Pixel coordinate mapped to v = 0.
    pub y_offset: f64,
    /// Pixels per unit of normalized coordinate.
    pub scale: f64,
    pub xcoeff: Vec<f64>,
    pub ycoeff: Vec<f64>,
}

impl PolynomialTransform {
    /// Create a model, checking the coefficient counts against `degree`.
    pub fn new(
        degree: u32,
        x_offset: f64,
        y_offset: f64,
        scale: f64,
        xcoeff: Vec<f64>,
        ycoeff: Vec<f64>,
    ) -> Result<Self> {
        let model = Self {
            degree,
            x_offset,
            y_offset,
            scale,
            xcoeff,
            ycoeff,
        };
        model.validate()?;
        Ok(model)
    }

    /// A degree-1 model equivalent to `fp = (pix - offset) / plate_scale`.
    pub fn linear(x_offset: f64, y_offset: f64, pixels_per_unit: f64) -> Self {
        Self {
            degree: 1,
            x_offset,
            y_offset,
            scale: pixels_per_unit,
            xcoeff: vec![0.0, 1.0, 0.0],
            ycoeff: vec![0.0, 0.0, 1.0],
        }
    }

    pub fn validate(&self) -> Result<()> {
        let n = num_terms(self.degree);
        if self.xcoeff.len() != n || self.ycoeff.len() != n {
            bail!(
                "degree {} polynomial needs {} coefficients per axis, got xcoeff={} ycoeff={}",
                self.degree,
                n,
                self.xcoeff.len(),
                self.ycoeff.len()
            );
        }
        if !(self.scale.is_finite() && self.scale != 0.0) {
            bail!("polynomial scale must be finite and nonzero, got {}", self.scale);
        }
        Ok(())
    }

    /// Camera pixels → plate coordinates (the fitted direction).
    pub fn pixel_to_plate(&self, x_pix: f64, y_pix: f64) -> (f64, f64) {
        let u = (x_pix - self.x_offset) / self.scale;
        let v = (y_pix - self.y_offset) / self.scale;
        (
            eval_poly(&self.xcoeff, self.degree, u, v),
            eval_poly(&self.ycoeff, self.degree, u, v),
        )
    }

    /// Plate coordinates → camera pixels, by Newton-Raphson inversion.
    pub fn plate_to_pixel(&self, x_fp: f64, y_fp: f64) -> (f64, f64) {
        let target = Vector2::new(x_fp, y_fp);
        let mut uv = self.linear_seed(target);

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let f = Vector2::new(
                eval_poly(&self.xcoeff, self.degree, uv.x, uv.y),
                eval_poly(&self.ycoeff, self.degree, uv.x, uv.y),
            );
            let residual = f - target;
            if residual.norm() < NEWTON_TOLERANCE * (1.0 + target.norm()) {
                break;
            }
            let (dxdu, dxdv) = eval_gradient(&self.xcoeff, self.degree, uv.x, uv.y);
            let (dydu, dydv) = eval_gradient(&self.ycoeff, self.degree, uv.x, uv.y);
            let jac = Matrix2::new(dxdu, dxdv, dydu, dydv);
            let Some(inv) = jac.try_inverse() else {
                break;
            };
            uv -= inv * residual;
        }

        (
            uv.x * self.scale + self.x_offset,
            uv.y * self.scale + self.y_offset,
        )
    }

    /// Starting point from the constant and linear terms only.
    ///
    /// Models without linear terms (degree 0, or fields set without
    /// [`validate`](Self::validate)) start from the origin.
    fn linear_seed(&self, target: Vector2<f64>) -> Vector2<f64> {
        if self.degree == 0 {
            return Vector2::zeros();
        }
        let (Some(&[x0, xu, xv]), Some(&[y0, yu, yv])) =
            (self.xcoeff.get(..3), self.ycoeff.get(..3))
        else {
            return Vector2::zeros();
        };
        let jac = Matrix2::new(xu, xv, yu, yv);
        let rhs = target - Vector2::new(x0, y0);
        jac.try_inverse().map(|inv| inv * rhs).unwrap_or_else(Vector2::zeros)
    }
}

/// Number of terms with 0 ≤ p+q ≤ degree.
pub fn num_terms(degree: u32) -> usize {
    let d = degree as usize;
    (d + 1) * (d + 2) / 2
}

/// Enumerate all (p, q) exponent pairs in coefficient order.
pub fn term_pairs(degree: u32) -> Vec<(u32, u32)> {
    let mut pairs = Vec::with_capacity(num_terms(degree));
    for s in 0..=degree {
        for p in (0..=s).rev() {
            pairs.push((p, s - p));
        }
    }
    pairs
}

fn eval_poly(coeffs: &[f64], degree: u32, u: f64, v: f64) -> f64 {
    term_pairs(degree)
        .into_iter()
        .zip(coeffs)
        .map(|((p, q), c)| c * u.powi(p as i32) * v.powi(q as i32))
        .sum()
}

/// Partial derivatives (∂/∂u, ∂/∂v) of the polynomial.
fn eval_gradient(coeffs: &[f64], degree: u32, u: f64, v: f64) -> (f64, f64) {
    let mut du = 0.0;
    let mut dv = 0.0;
    for ((p, q), c) in term_pairs(degree).into_iter().zip(coeffs) {
        if p > 0 {
            du += c * p as f64 * u.powi(p as i32 - 1) * v.powi(q as i32);
        }
        if q > 0 {
            dv += c * q as f64 * u.powi(p as i32) * v.powi(q as i32 - 1);
        }
    }
    (du, dv)
}
