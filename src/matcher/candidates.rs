//! Fiducial candidate detection.
//!
//! The pinholes of one fiducial sit a few pixels apart, much closer than
//! unrelated spots. A spot is a candidate when at least `min_neighbors` of
//! its `cluster_size` nearest spots (itself included) lie within
//! `separation`. Its in-range neighbours form its cluster.

use crate::spotindex::SpotIndex;

use super::FindFiducialsConfig;

/// A candidate spot and the nearby spots that make up its fiducial cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Spot-table index of the candidate.
    pub center: usize,
    /// Spot-table indices of the in-range neighbours, nearest first. The
    /// candidate itself comes first.
    pub members: Vec<usize>,
}

/// Find candidate spots, returning one cluster per candidate in spot order.
pub fn detect_candidates(positions: &[[f64; 2]], config: &FindFiducialsConfig) -> Vec<Cluster> {
    let index = SpotIndex::new(config.separation, positions);
    positions
        .iter()
        .enumerate()
        .filter_map(|(i, &p)| {
            let neighbors = index.k_nearest_within(p, config.cluster_size, config.separation);
            if neighbors.len() < config.min_neighbors {
                return None;
            }
            let mut members: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
            // Coincident spots can push the query point off the front.
            if let Some(pos) = members.iter().position(|&m| m == i) {
                members[..=pos].rotate_right(1);
            }
            Some(Cluster { center: i, members })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_spot_is_not_a_candidate() {
        let positions = vec![
            [100.0, 100.0],
            [102.0, 100.0],
            [100.0, 102.0],
            [102.0, 102.0],
            [300.0, 300.0],
        ];
        let clusters = detect_candidates(&positions, &FindFiducialsConfig::default());
        let centers: Vec<usize> = clusters.iter().map(|c| c.center).collect();
        assert_eq!(centers, vec![0, 1, 2, 3]);
        for c in &clusters {
            assert_eq!(c.members[0], c.center);
            let mut m = c.members.clone();
            m.sort_unstable();
            assert_eq!(m, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn pairs_are_not_enough() {
        let positions = vec![[0.0, 0.0], [3.0, 0.0], [500.0, 0.0], [503.0, 0.0]];
        assert!(detect_candidates(&positions, &FindFiducialsConfig::default()).is_empty());
    }

    #[test]
    fn nan_spots_are_ignored() {
        let positions = vec![
            [0.0, 0.0],
            [500.0, 0.0],
            [0.0, 500.0],
            [f64::NAN, f64::NAN],
            [f64::NAN, 0.0],
        ];
        let clusters = detect_candidates(&positions, &FindFiducialsConfig::default());
        assert!(clusters.is_empty(), "unexpected candidates {clusters:?}");
    }

    #[test]
    fn cluster_is_capped_at_cluster_size() {
        // Five spots within range of each other; only four are queried.
        let positions = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 2.0]];
        let clusters = detect_candidates(&positions, &FindFiducialsConfig::default());
        assert_eq!(clusters.len(), 5);
        assert!(clusters.iter().all(|c| c.members.len() == 4));
    }

    #[test]
    fn separation_is_respected() {
        let positions = vec![[0.0, 0.0], [6.0, 0.0], [0.0, 6.0]];
        let tight = FindFiducialsConfig {
            separation: 5.0,
            ..Default::default()
        };
        assert!(detect_candidates(&positions, &tight).is_empty());
        // (6,0)-(0,6) are 8.5 px apart, so only the corner sees both others.
        let clusters = detect_candidates(&positions, &FindFiducialsConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].center, 0);
    }
}
