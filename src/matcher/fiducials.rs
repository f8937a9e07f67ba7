//! Coarse matching of fiducial centers to candidate spots.
//!
//! The projected fiducial layout and the camera frame differ by a residual
//! translation (pointing error, transform drift). Each fiducial center is
//! paired with its nearest candidate, the per-axis median of the residuals
//! is taken as the translation estimate and removed from the layout, and the
//! pairing is redone. After the refinement rounds, only pairs closer than
//! `max_distance` are kept. Unmatched centers and spurious candidates are
//! dropped silently.

use tracing::debug;

use crate::spotindex::{Neighbor, SpotIndex};

use super::FindFiducialsConfig;

/// One accepted (candidate, fiducial) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialMatch {
    /// Index into the candidate positions.
    pub candidate: usize,
    /// Index into the fiducial centers.
    pub fiducial: usize,
    /// `LOCATION` of the fiducial.
    pub location: u32,
    /// Final distance in pixels, after offset removal.
    pub distance: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiducialMatches {
    /// Accepted pairs, in fiducial order.
    pub pairs: Vec<FiducialMatch>,
    /// Cumulative `(dx, dy)` subtracted from the fiducial layout.
    pub offset: [f64; 2],
}

impl FiducialMatches {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Pair fiducial centers (pixel positions, with their `LOCATION`s) with candidates.
pub fn match_fiducials(
    candidates: &[[f64; 2]],
    centers: &[[f64; 2]],
    locations: &[u32],
    config: &FindFiducialsConfig,
) -> FiducialMatches {
    debug_assert_eq!(centers.len(), locations.len());
    if candidates.is_empty() || centers.is_empty() {
        return FiducialMatches::default();
    }

    let index = SpotIndex::from_points(candidates);
    let mut layout = centers.to_vec();
    let mut nearest = query_nearest(&index, &layout);
    log_distances("initial", &nearest, candidates.len(), centers.len());

    let mut offset = [0.0f64; 2];
    for round in 0..config.refine_iterations {
        let mut rx: Vec<f64> = Vec::with_capacity(layout.len());
        let mut ry: Vec<f64> = Vec::with_capacity(layout.len());
        for (c, n) in layout.iter().zip(&nearest) {
            let p = candidates[n.index];
            rx.push(c[0] - p[0]);
            ry.push(c[1] - p[1]);
        }
        let dx = median(&mut rx);
        let dy = median(&mut ry);
        debug!("round {}: offset dx={:.1} dy={:.1}", round + 1, dx, dy);

        for c in layout.iter_mut() {
            c[0] -= dx;
            c[1] -= dy;
        }
        offset[0] += dx;
        offset[1] += dy;
        nearest = query_nearest(&index, &layout);
        log_distances("refined", &nearest, candidates.len(), centers.len());
    }

    let pairs: Vec<FiducialMatch> = nearest
        .iter()
        .enumerate()
        .filter(|(_, n)| n.distance < config.max_distance)
        .map(|(i, n)| FiducialMatch {
            candidate: n.index,
            fiducial: i,
            location: locations[i],
            distance: n.distance,
        })
        .collect();

    if !pairs.is_empty() {
        let mean = pairs.iter().map(|p| p.distance).sum::<f64>() / pairs.len() as f64;
        debug!(
            "mean distance = {:.2} pixels for {} matched and {} known fiducials",
            mean,
            pairs.len(),
            centers.len()
        );
    }

    FiducialMatches { pairs, offset }
}

fn query_nearest(index: &SpotIndex, layout: &[[f64; 2]]) -> Vec<Neighbor> {
    // The index is non-empty, so every query has an answer.
    layout.iter().filter_map(|&c| index.nearest(c)).collect()
}

fn log_distances(stage: &str, nearest: &[Neighbor], num_candidates: usize, num_centers: usize) {
    let mut d: Vec<f64> = nearest.iter().map(|n| n.distance).collect();
    debug!(
        "{} med. distance = {:.2} pixels for {} candidates and {} known fiducials",
        stage,
        median(&mut d),
        num_candidates,
        num_centers
    );
}

/// Median of a sample; the mean of the two central values for even counts.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
