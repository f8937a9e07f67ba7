//! Metrology context: the reference pinhole table, projected to pixels.
//!
//! The context is built once per session from the metrology table and a
//! plate-to-pixel transform, then shared by reference across exposures:
//! 1. Drop non-pinhole rows, reject duplicate `(LOCATION, PINHOLE_ID)` pairs.
//! 2. Project every pinhole to pixels through the transform.
//! 3. Sort by `(LOCATION, PINHOLE_ID)` so each fiducial is a contiguous slice.
//! 4. Record the central pinhole of each fiducial as its reference position.
//!
//! Projection happens exactly once, here. A different transform means a new
//! context ([`MetrologyContext::reproject`]). Contexts can be snapshotted with
//! rkyv to skip CSV parsing and projection on later runs.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use crate::metrology::{read_metrology_csv, MetrologyPinhole};
use crate::transform::PlateToPixel;

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct MetrologyContext {
    /// Fiducial pinholes sorted by `(location, pinhole_id)`, with pixel positions.
    pub pinholes: Vec<MetrologyPinhole>,
    /// Indices into `pinholes` of each fiducial's central pinhole, in location order.
    pub centers: Vec<u32>,
}

impl MetrologyContext {
    /// Build a context from metrology pinholes and a plate-to-pixel transform.
    pub fn new<T>(mut pinholes: Vec<MetrologyPinhole>, transform: &T) -> Result<Self>
    where
        T: PlateToPixel + ?Sized,
    {
        for p in pinholes.iter_mut() {
            let (x, y) = transform.plate_to_pixel(p.x_fp, p.y_fp);
            p.x_pix = x;
            p.y_pix = y;
        }
        let ctx = Self::from_projected(pinholes)?;
        info!(
            "Metrology context: {} pinholes, {} fiducials with a central pinhole",
            ctx.pinholes.len(),
            ctx.centers.len()
        );
        Ok(ctx)
    }

    /// Read the metrology CSV and build a context.
    pub fn from_csv<P, T>(path: P, transform: &T) -> Result<Self>
    where
        P: AsRef<Path>,
        T: PlateToPixel + ?Sized,
    {
        let path = path.as_ref();
        info!("Reading metrology in {}", path.display());
        let pinholes = read_metrology_csv(path)?;
        Self::new(pinholes, transform)
    }

    /// Build a context from pinholes whose pixel positions are already set.
    pub fn from_projected(mut pinholes: Vec<MetrologyPinhole>) -> Result<Self> {
        pinholes.retain(|p| p.pinhole_id > 0);
        pinholes.sort_by_key(|p| (p.location, p.pinhole_id));
        for w in pinholes.windows(2) {
            if (w[0].location, w[0].pinhole_id) == (w[1].location, w[1].pinhole_id) {
                bail!(
                    "duplicate metrology entry LOCATION={} PINHOLE_ID={}",
                    w[0].location,
                    w[0].pinhole_id
                );
            }
        }
        let centers = pinholes
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_center())
            .map(|(i, _)| i as u32)
            .collect();
        Ok(Self { pinholes, centers })
    }

    /// A new context with pixel positions recomputed through another transform.
    pub fn reproject<T>(&self, transform: &T) -> Result<Self>
    where
        T: PlateToPixel + ?Sized,
    {
        Self::new(self.pinholes.clone(), transform)
    }

    /// Total number of fiducial pinholes.
    pub fn len(&self) -> usize {
        self.pinholes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinholes.is_empty()
    }

    /// Number of fiducials that have a central pinhole.
    pub fn num_fiducials(&self) -> usize {
        self.centers.len()
    }

    /// Central pinholes, one per fiducial, in location order.
    pub fn fiducial_centers(&self) -> impl Iterator<Item = &MetrologyPinhole> + '_ {
        self.centers.iter().map(|&i| &self.pinholes[i as usize])
    }

    /// All pinholes of one fiducial (empty if the location is unknown).
    pub fn fiducial_pinholes(&self, location: u32) -> &[MetrologyPinhole] {
        let start = self.pinholes.partition_point(|p| p.location < location);
        let end = self.pinholes.partition_point(|p| p.location <= location);
        &self.pinholes[start..end]
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl MetrologyContext {
    /// Serialize the context to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Deserialize a context from rkyv bytes.
    ///
    /// The pinhole order and center indices are rebuilt from the decoded
    /// pinholes, so a stale or edited snapshot cannot index out of range.
    pub fn from_rkyv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        let ctx = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        Self::from_projected(ctx.pinholes).context("invalid metrology snapshot")
    }

    /// Save the context to a file using rkyv.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("cannot write metrology snapshot {}", path.display()))?;
        info!("Saved metrology context to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a context from an rkyv file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("cannot read metrology snapshot {}", path.display()))?;
        let ctx = Self::from_rkyv_bytes(&bytes)?;
        info!(
            "Loaded metrology context: {} pinholes, {} fiducials",
            ctx.pinholes.len(),
            ctx.centers.len()
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::AffineTransform;

    fn two_fiducials() -> Vec<MetrologyPinhole> {
        vec![
            MetrologyPinhole::new(200, 4, 10.0, 10.0),
            MetrologyPinhole::new(100, 2, 0.0, 1.0),
            MetrologyPinhole::new(100, 4, 0.0, 0.0),
            MetrologyPinhole::new(100, 1, 1.0, 0.0),
            MetrologyPinhole::new(200, 1, 11.0, 10.0),
            MetrologyPinhole::new(300, 0, 50.0, 50.0),
        ]
    }

    #[test]
    fn projects_sorts_and_finds_centers() {
        let shift = |x: f64, y: f64| (x * 10.0 + 100.0, y * 10.0 + 50.0);
        let ctx = MetrologyContext::new(two_fiducials(), &shift).unwrap();

        assert_eq!(ctx.len(), 5, "non-pinhole rows are dropped");
        assert_eq!(ctx.num_fiducials(), 2);

        let centers: Vec<u32> = ctx.fiducial_centers().map(|p| p.location).collect();
        assert_eq!(centers, vec![100, 200]);

        let f100 = ctx.fiducial_pinholes(100);
        let ids: Vec<u32> = f100.iter().map(|p| p.pinhole_id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(f100[0].pixel_position(), [110.0, 50.0]);
        assert!(ctx.fiducial_pinholes(999).is_empty());
    }

    #[test]
    fn duplicate_pinhole_is_rejected() {
        let mut pinholes = two_fiducials();
        pinholes.push(MetrologyPinhole::new(100, 1, 5.0, 5.0));
        let err = MetrologyContext::new(pinholes, &|x: f64, y: f64| (x, y)).unwrap_err();
        assert!(err.to_string().contains("LOCATION=100 PINHOLE_ID=1"));
    }

    #[test]
    fn reproject_uses_the_new_transform() {
        let ctx = MetrologyContext::new(two_fiducials(), &|x: f64, y: f64| (x, y)).unwrap();
        let moved = ctx.reproject(&AffineTransform::new(2.0, 0.0, 1.0, 1.0)).unwrap();
        let c = moved.fiducial_centers().last().unwrap();
        assert_eq!(c.pixel_position(), [21.0, 21.0]);
        // The original is untouched.
        let c = ctx.fiducial_centers().last().unwrap();
        assert_eq!(c.pixel_position(), [10.0, 10.0]);
    }

    #[test]
    fn rkyv_roundtrip() {
        let ctx = MetrologyContext::new(two_fiducials(), &|x: f64, y: f64| (x + 0.25, y - 0.5)).unwrap();
        let bytes = ctx.to_rkyv_bytes().unwrap();
        let back = MetrologyContext::from_rkyv_bytes(&bytes).unwrap();
        assert_eq!(back.pinholes, ctx.pinholes);
        assert_eq!(back.centers, ctx.centers);
    }

    #[test]
    fn stale_snapshot_is_rebuilt() {
        let ctx = MetrologyContext::new(two_fiducials(), &|x: f64, y: f64| (x, y)).unwrap();
        let mut stale = ctx.clone();
        stale.pinholes.reverse();
        stale.centers = vec![99, 0];
        let back = MetrologyContext::from_rkyv_bytes(&stale.to_rkyv_bytes().unwrap()).unwrap();
        assert_eq!(back.pinholes, ctx.pinholes);
        assert_eq!(back.centers, ctx.centers);
        let ids: Vec<u32> = back.fiducial_pinholes(200).iter().map(|p| p.pinhole_id).collect();
        assert_eq!(ids, vec![1, 4]);

        let mut duplicated = ctx.clone();
        duplicated.pinholes.push(duplicated.pinholes[0].clone());
        let err = MetrologyContext::from_rkyv_bytes(&duplicated.to_rkyv_bytes().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate metrology entry"), "{err:#}");
    }
}
