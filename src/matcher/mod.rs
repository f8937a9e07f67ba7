//! Fiducial and pinhole identification.
//!
//! Given the spots measured in one camera exposure and the known metrology
//! of the focal plate, this module works out which spots are fiducial
//! pinholes, which fiducial each belongs to, and which pinhole of that
//! fiducial each one is. Only 2D geometry is used:
//!
//! 1. **Candidate detection**: spots with enough close neighbours form dense
//!    clusters, as the pinholes of one fiducial do.
//! 2. **Fiducial matching**: each known fiducial center is paired with its
//!    nearest candidate, iteratively removing the median global offset.
//! 3. **Triangle invariants**: every triangle in a cluster and in the matched
//!    fiducial's metrology gets a similarity-invariant `(ratio, cosine)` key.
//! 4. **Pinhole assignment**: measured triangles are greedily paired with
//!    metrology triangles, most similar first, and their vertices labelled.
//!
//! Per-cluster results are immutable [`ClusterAssignment`]s, merged into the
//! spot table as the last step.

pub mod assign;
pub mod candidates;
pub mod context;
pub mod fiducials;
pub mod find;
pub mod triangles;

pub use assign::assign_pinholes;
pub use candidates::{detect_candidates, Cluster};
pub use context::MetrologyContext;
pub use fiducials::{match_fiducials, FiducialMatch, FiducialMatches};
pub use find::merge_assignments;
pub use triangles::{compute_triangles, Triangle};

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling fiducial identification.
#[derive(Debug, Clone, PartialEq)]
pub struct FindFiducialsConfig {
    /// Maximum distance (pixels) between pinholes of one fiducial. Default 7.
    pub separation: f64,
    /// Neighbours queried per spot, the spot itself included. Default 4.
    ///
    /// This also caps the size of a cluster handed to pinhole assignment.
    pub cluster_size: usize,
    /// Minimum in-range neighbours (self included) for a spot to be a
    /// fiducial candidate. Default 3.
    pub min_neighbors: usize,
    /// Maximum distance (pixels) between a fiducial center and its matched
    /// candidate after offset refinement. Default 10.
    pub max_distance: f64,
    /// Number of median-offset refinement rounds. Default 2.
    pub refine_iterations: u32,
    /// Largest squared triangle-match distance accepted. Default 1e-3.
    pub max_triangle_distance2: f64,
    /// Triangles whose first-vertex cosine exceeds this are too flat to be
    /// trusted and are skipped. Default 0.9.
    pub max_vertex_cosine: f64,
}

impl Default for FindFiducialsConfig {
    fn default() -> Self {
        Self {
            separation: 7.0,
            cluster_size: 4,
            min_neighbors: 3,
            max_distance: 10.0,
            refine_iterations: 2,
            max_triangle_distance2: 1e-3,
            max_vertex_cosine: 0.9,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// One spot's pinhole identity, as decided for a single cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeAssignment {
    /// Index into the exposure's spot table.
    pub spot: usize,
    pub pinhole_id: u32,
    /// Match distance of the triangle that fixed this assignment.
    pub distance2: f64,
}

/// Outcome of pinhole assignment for one matched cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// Fiducial id shared by every assigned spot.
    pub location: u32,
    /// Assigned spots, in order of assignment.
    pub assignments: Vec<PinholeAssignment>,
    /// Number of triangle pairs accepted.
    pub accepted_triangles: usize,
    /// Triangle pairs rejected for contradicting an earlier, better match.
    pub conflicts: usize,
    /// Whether every spot of the cluster received a pinhole id.
    pub complete: bool,
}

impl ClusterAssignment {
    pub(crate) fn empty(location: u32) -> Self {
        Self {
            location,
            assignments: Vec::new(),
            accepted_triangles: 0,
            conflicts: 0,
            complete: false,
        }
    }

    /// Pinhole id given to `spot`, if any.
    pub fn pinhole_for(&self, spot: usize) -> Option<u32> {
        self.assignments
            .iter()
            .find(|a| a.spot == spot)
            .map(|a| a.pinhole_id)
    }
}

/// Summary of one [`MetrologyContext::find_fiducials`] call.
#[derive(Debug, Clone)]
pub struct FindResult {
    /// Number of spots in the exposure.
    pub num_spots: usize,
    /// Number of spots flagged as fiducial candidates.
    pub num_candidates: usize,
    /// Accepted (candidate, fiducial) pairs and the fitted global offset.
    pub matches: FiducialMatches,
    /// Per-cluster pinhole assignments, parallel to `matches.pairs`.
    pub clusters: Vec<ClusterAssignment>,
    /// Spots labelled by this call.
    pub num_identified: usize,
    /// Spot labels dropped because another cluster claimed the spot with a
    /// better match.
    pub merge_conflicts: usize,
    /// Wall time spent in detection, matching and assignment.
    pub time_ms: f32,
}
