//! The full identification pipeline and the merge into the spot table.

use std::collections::HashMap;
use std::time::Instant;

use tracing::info;

use crate::metrology::MetrologyPinhole;
use crate::spot::SpotTable;

use super::assign::assign_pinholes;
use super::candidates::detect_candidates;
use super::fiducials::match_fiducials;
use super::{ClusterAssignment, FindFiducialsConfig, FindResult, MetrologyContext, PinholeAssignment};

impl MetrologyContext {
    /// Identify fiducial pinholes among the spots of one exposure and label
    /// them in place.
    ///
    /// Spots that are not recognized keep their previous `location` and
    /// `pinhole_id`. Finding nothing is not an error.
    pub fn find_fiducials(&self, table: &mut SpotTable, config: &FindFiducialsConfig) -> FindResult {
        let mut result = self.identify(&table.positions(), config);
        let (identified, conflicts) = merge_assignments(table, &result.clusters);
        result.num_identified = identified;
        result.merge_conflicts = conflicts;

        info!(
            "Matched {} of {} fiducials ({} candidates among {} spots), identified {} pinholes in {:.1} ms",
            result.matches.len(),
            self.num_fiducials(),
            result.num_candidates,
            result.num_spots,
            result.num_identified,
            result.time_ms
        );
        result
    }

    /// Run detection, matching and assignment without touching any spot table.
    ///
    /// `num_identified` and `merge_conflicts` are left at zero; they are
    /// filled in by [`merge_assignments`] through [`Self::find_fiducials`].
    pub fn identify(&self, positions: &[[f64; 2]], config: &FindFiducialsConfig) -> FindResult {
        let t0 = Instant::now();

        let clusters = detect_candidates(positions, config);
        let candidate_xy: Vec<[f64; 2]> = clusters.iter().map(|c| positions[c.center]).collect();
        let centers: Vec<&MetrologyPinhole> = self.fiducial_centers().collect();
        let center_xy: Vec<[f64; 2]> = centers.iter().map(|p| p.pixel_position()).collect();
        let locations: Vec<u32> = centers.iter().map(|p| p.location).collect();

        let matches = match_fiducials(&candidate_xy, &center_xy, &locations, config);

        let assignments = matches
            .pairs
            .iter()
            .map(|pair| {
                let cluster = &clusters[pair.candidate];
                let measured: Vec<[f64; 2]> = cluster.members.iter().map(|&i| positions[i]).collect();
                let pinholes = self.fiducial_pinholes(pair.location);
                let metrology: Vec<[f64; 2]> = pinholes.iter().map(|p| p.pixel_position()).collect();
                let ids: Vec<u32> = pinholes.iter().map(|p| p.pinhole_id).collect();

                let c = candidate_xy[pair.candidate];
                let f = center_xy[pair.fiducial];
                assign_pinholes(
                    &measured,
                    &cluster.members,
                    &metrology,
                    &ids,
                    [c[0] - f[0], c[1] - f[1]],
                    pair.location,
                    config,
                )
            })
            .collect();

        FindResult {
            num_spots: positions.len(),
            num_candidates: clusters.len(),
            matches,
            clusters: assignments,
            num_identified: 0,
            merge_conflicts: 0,
            time_ms: t0.elapsed().as_secs_f32() * 1000.0,
        }
    }
}

/// Write per-cluster assignments into the spot table.
///
/// When several clusters label the same spot, the assignment with the lower
/// `distance2` wins (the earlier cluster on ties). Returns the number of
/// spots labelled and the number of assignments dropped in favour of a
/// better one.
pub fn merge_assignments(table: &mut SpotTable, clusters: &[ClusterAssignment]) -> (usize, usize) {
    let mut winners: HashMap<usize, (u32, PinholeAssignment)> = HashMap::new();
    let mut conflicts = 0;
    for cluster in clusters {
        for a in &cluster.assignments {
            let replace = match winners.get(&a.spot) {
                Some((_, held)) => {
                    conflicts += 1;
                    a.distance2 < held.distance2
                }
                None => true,
            };
            if replace {
                winners.insert(a.spot, (cluster.location, *a));
            }
        }
    }

    let mut identified = 0;
    for (spot, (location, a)) in winners {
        let Some(s) = table.spots.get_mut(spot) else {
            continue;
        };
        s.location = location;
        s.pinhole_id = a.pinhole_id;
        identified += 1;
    }
    (identified, conflicts)
}
