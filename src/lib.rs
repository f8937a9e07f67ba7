//! # fidmatch
//!
//! Identification of **fiducial pinholes** in focal-plane camera images.
//!
//! A focal plate carries fixed fiducials, each a small group of back-lit
//! pinholes etched at known positions. Given the light spots measured in one
//! camera exposure, `fidmatch` finds the spots that are fiducial pinholes and
//! labels each with its fiducial (`LOCATION`) and its role inside the fiducial
//! (`PINHOLE_ID`). Only 2D positions are used: no fluxes, no prior labels.
//!
//! ## Example
//!
//! ```no_run
//! use fidmatch::{load_transform, read_spots_csv, write_spots_csv};
//! use fidmatch::{FindFiducialsConfig, MetrologyContext};
//!
//! // Project the metrology once per session
//! let transform = load_transform("data/plate2camera.json").unwrap();
//! let ctx = MetrologyContext::from_csv("data/fp-metrology.csv", &transform).unwrap();
//!
//! // Label the spots of an exposure
//! let mut spots = read_spots_csv("spots.csv").unwrap();
//! let result = ctx.find_fiducials(&mut spots, &FindFiducialsConfig::default());
//! println!(
//!     "Matched {} fiducials, identified {} pinholes",
//!     result.matches.len(),
//!     result.num_identified
//! );
//! write_spots_csv("spots-labelled.csv", &spots).unwrap();
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Candidate detection**: spots with at least two other spots within
//!    `separation` pixels are fiducial candidates
//! 2. **Fiducial matching**: each fiducial's central pinhole is paired with the
//!    nearest candidate; the median offset is removed and the pairing redone
//! 3. **Triangle invariants**: every triangle in a candidate's cluster and in
//!    the fiducial's metrology is described by a side ratio and a vertex cosine
//! 4. **Pinhole assignment**: measured triangles are paired with metrology
//!    triangles, most similar first, rejecting pairs that contradict earlier ones
//! 5. **Merge**: per-cluster labels are written into the spot table
//!
//! The plate-to-pixel mapping is any [`PlateToPixel`]; closures work, and
//! affine and polynomial models can be read from JSON.

pub mod matcher;
pub mod metrology;
pub mod spot;
pub mod spotindex;
pub mod transform;

pub use matcher::{
    ClusterAssignment, FiducialMatch, FiducialMatches, FindFiducialsConfig, FindResult,
    MetrologyContext, PinholeAssignment,
};
pub use metrology::{read_metrology, read_metrology_csv, MetrologyPinhole, CENTER_PINHOLE_ID};
pub use spot::{read_spots, read_spots_csv, write_spots, write_spots_csv, Spot, SpotTable};
pub use spotindex::{Neighbor, SpotIndex};
pub use transform::{
    load_transform, AffineTransform, PlateToPixel, PlateTransform, PolynomialTransform,
};
