//! Focal-plane metrology: the known physical positions of fiducial pinholes.
//!
//! The metrology table lists every device on the plate. Rows with a nonzero
//! `PINHOLE_ID` are fiducial pinholes; pinhole 4 is the central dot of its
//! fiducial and serves as the fiducial's reference position. Rows with
//! `PINHOLE_ID == 0` (positioners and other non-fiducial devices) are dropped.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rkyv::{Archive, Deserialize, Serialize};

use crate::spot::{parse_field, LOCATION, PINHOLE_ID};

/// Pinhole id of a fiducial's central dot.
pub const CENTER_PINHOLE_ID: u32 = 4;

/// Physical x column in the metrology table (plate coordinates, mm).
pub const X_FP: &str = "X_FP";
/// Physical y column in the metrology table (plate coordinates, mm).
pub const Y_FP: &str = "Y_FP";

/// A known fiducial pinhole.
///
/// `x_pix` / `y_pix` are derived from the plate position through a
/// [`PlateToPixel`](crate::PlateToPixel) transform when a
/// [`MetrologyContext`](crate::MetrologyContext) is built; they are zero until then.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct MetrologyPinhole {
    pub location: u32,
    pub pinhole_id: u32,
    pub x_fp: f64,
    pub y_fp: f64,
    pub x_pix: f64,
    pub y_pix: f64,
}

impl MetrologyPinhole {
    /// A pinhole at a plate position, not yet projected to pixels.
    pub fn new(location: u32, pinhole_id: u32, x_fp: f64, y_fp: f64) -> Self {
        Self {
            location,
            pinhole_id,
            x_fp,
            y_fp,
            x_pix: 0.0,
            y_pix: 0.0,
        }
    }

    pub fn is_center(&self) -> bool {
        self.pinhole_id == CENTER_PINHOLE_ID
    }

    pub fn pixel_position(&self) -> [f64; 2] {
        [self.x_pix, self.y_pix]
    }
}

/// Read fiducial pinholes from a metrology CSV reader.
///
/// Columns `LOCATION`, `PINHOLE_ID`, `X_FP` and `Y_FP` are required, in any
/// order; other columns are ignored. Non-pinhole rows are skipped.
pub fn read_metrology<R: std::io::Read>(reader: R) -> Result<Vec<MetrologyPinhole>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("reading metrology header")?.clone();
    let column = |name: &str| -> Result<usize> {
        match headers.iter().position(|h| h.trim() == name) {
            Some(i) => Ok(i),
            None => bail!("metrology table is missing required column {}", name),
        }
    };
    let iloc = column(LOCATION)?;
    let ipin = column(PINHOLE_ID)?;
    let ix = column(X_FP)?;
    let iy = column(Y_FP)?;

    let mut pinholes = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading metrology row {}", row + 1))?;
        let pinhole_id = parse_field::<u32>(&record, ipin, PINHOLE_ID, row)?;
        if pinhole_id == 0 {
            continue;
        }
        pinholes.push(MetrologyPinhole::new(
            parse_field::<u32>(&record, iloc, LOCATION, row)?,
            pinhole_id,
            parse_field::<f64>(&record, ix, X_FP, row)?,
            parse_field::<f64>(&record, iy, Y_FP, row)?,
        ));
    }
    Ok(pinholes)
}

/// Read fiducial pinholes from a metrology CSV file.
pub fn read_metrology_csv<P: AsRef<Path>>(path: P) -> Result<Vec<MetrologyPinhole>> {
    let path = path.as_ref();
    if !path.is_file() {
        bail!("cannot find metrology file {}", path.display());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open metrology file {}", path.display()))?;
    read_metrology(file).with_context(|| format!("in metrology file {}", path.display()))
}
