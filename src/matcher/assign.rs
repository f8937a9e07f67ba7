//! Pinhole assignment within one matched cluster.
//!
//! Every measured triangle is compared with every metrology triangle of the
//! matched fiducial using
//!
//! ```text
//! d² = (r₁ − r₂)² + (c₁ − c₂)² + (|u₁·u₂| − 1)²
//! ```
//!
//! where `u` is the unit direction of a triangle's first side. Measured
//! triangles are then taken most-similar first. Flat triangles are skipped,
//! the walk stops at the first match above `max_triangle_distance2`, and an
//! accepted pair labels its three measured vertices with the pinhole ids of
//! the corresponding metrology vertices.
//!
//! A pair that contradicts an earlier accepted pair (a spot already labelled
//! with another id, or an id already given to another spot) is rejected as a
//! whole. Earlier pairs have lower distance, so the best match wins and
//! labels within a cluster stay one-to-one.

use std::collections::HashMap;

use nalgebra::DMatrix;
use tracing::debug;

use super::triangles::{compute_triangles, Triangle};
use super::{ClusterAssignment, FindFiducialsConfig, PinholeAssignment};

/// Metrology triangles within this distance of the best one are treated as
/// equally good and separated by vertex residual instead.
const MATCH_TIE_TOLERANCE: f64 = 1e-9;

/// Label the spots of one cluster with pinhole ids.
///
/// - `measured`: pixel positions of the cluster's spots.
/// - `spots`: spot-table index of each entry in `measured`.
/// - `metrology`, `pinhole_ids`: projected pixel positions and ids of the
///   matched fiducial's pinholes.
/// - `shift`: approximate displacement from the metrology layout to the
///   measured one (the matched candidate minus the fiducial center). Only
///   used to choose between metrology triangles of identical shape.
pub fn assign_pinholes(
    measured: &[[f64; 2]],
    spots: &[usize],
    metrology: &[[f64; 2]],
    pinhole_ids: &[u32],
    shift: [f64; 2],
    location: u32,
    config: &FindFiducialsConfig,
) -> ClusterAssignment {
    debug_assert_eq!(measured.len(), spots.len());
    debug_assert_eq!(metrology.len(), pinhole_ids.len());

    let mut result = ClusterAssignment::empty(location);
    let mt = compute_triangles(measured);
    let kt = compute_triangles(metrology);
    if mt.is_empty() || kt.is_empty() {
        return result;
    }

    let mdir: Vec<[f64; 2]> = mt.iter().map(|t| t.first_side_direction(measured)).collect();
    let kdir: Vec<[f64; 2]> = kt.iter().map(|t| t.first_side_direction(metrology)).collect();
    let dist2 = DMatrix::from_fn(mt.len(), kt.len(), |i, j| {
        pair_distance2(&mt[i], mdir[i], &kt[j], kdir[j])
    });

    // Best metrology triangle for each measured one.
    let best: Vec<(usize, f64)> = (0..mt.len())
        .map(|i| {
            let mut best_j = 0;
            for j in 1..kt.len() {
                if dist2[(i, j)] < dist2[(i, best_j)] {
                    best_j = j;
                }
            }
            let limit = dist2[(i, best_j)] + MATCH_TIE_TOLERANCE;
            let mut best_r = vertex_residual(&mt[i], measured, &kt[best_j], metrology, shift);
            for j in 0..kt.len() {
                if j == best_j || dist2[(i, j)] > limit {
                    continue;
                }
                let r = vertex_residual(&mt[i], measured, &kt[j], metrology, shift);
                if r < best_r {
                    best_r = r;
                    best_j = j;
                }
            }
            (best_j, dist2[(i, best_j)])
        })
        .collect();

    let mut ranked: Vec<usize> = (0..mt.len()).collect();
    ranked.sort_by(|&a, &b| best[a].1.total_cmp(&best[b].1));

    let mut labels = vec![0u32; measured.len()];
    let mut claimed: HashMap<u32, usize> = HashMap::new();

    for i in ranked {
        let (j, d2) = best[i];
        if mt[i].cosine > config.max_vertex_cosine {
            continue;
        }
        if d2 > config.max_triangle_distance2 {
            break;
        }

        let pairs: [(usize, u32); 3] =
            std::array::from_fn(|v| (mt[i].indices[v], pinhole_ids[kt[j].indices[v]]));
        let consistent = pairs.iter().all(|&(spot, id)| {
            (labels[spot] == 0 || labels[spot] == id)
                && !matches!(claimed.get(&id), Some(&owner) if owner != spot)
        });
        if !consistent {
            result.conflicts += 1;
            continue;
        }

        for (spot, id) in pairs {
            if labels[spot] == 0 {
                labels[spot] = id;
                claimed.insert(id, spot);
                result.assignments.push(PinholeAssignment {
                    spot: spots[spot],
                    pinhole_id: id,
                    distance2: d2,
                });
            }
        }
        result.accepted_triangles += 1;

        if labels.iter().all(|&l| l != 0) {
            result.complete = true;
            debug!("all pinholes matched for LOCATION={}", location);
            break;
        }
    }

    if result.conflicts > 0 {
        debug!(
            "LOCATION={}: {} conflicting triangle matches rejected",
            location, result.conflicts
        );
    }
    result
}

/// Squared match distance between a measured and a metrology triangle.
fn pair_distance2(a: &Triangle, adir: [f64; 2], b: &Triangle, bdir: [f64; 2]) -> f64 {
    if a.ratio.is_infinite() || b.ratio.is_infinite() {
        return f64::INFINITY;
    }
    let dr = a.ratio - b.ratio;
    let dc = a.cosine - b.cosine;
    let parallel = (adir[0] * bdir[0] + adir[1] * bdir[1]).abs() - 1.0;
    dr * dr + dc * dc + parallel * parallel
}

/// Summed squared distance between corresponding vertices, metrology shifted.
fn vertex_residual(
    a: &Triangle,
    measured: &[[f64; 2]],
    b: &Triangle,
    metrology: &[[f64; 2]],
    shift: [f64; 2],
) -> f64 {
    a.indices
        .iter()
        .zip(&b.indices)
        .map(|(&ia, &ib)| {
            let dx = measured[ia][0] - metrology[ib][0] - shift[0];
            let dy = measured[ia][1] - metrology[ib][1] - shift[1];
            dx * dx + dy * dy
        })
        .sum()
}
