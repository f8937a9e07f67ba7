//! Measured spots and the per-exposure spot table.
//!
//! A spot is a light centroid measured on the camera, in pixel coordinates.
//! Spots carry two identity labels that this crate fills in:
//! `LOCATION` (which fiducial) and `PINHOLE_ID` (which pinhole within it).
//! Zero means "unassigned" for both.
//!
//! Spot tables are read from and written to CSV. Columns other than the
//! position and identity columns are carried through untouched.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Name of the required pixel x column.
pub const XPIX: &str = "XPIX";
/// Name of the required pixel y column.
pub const YPIX: &str = "YPIX";
/// Name of the optional fiducial-id column.
pub const LOCATION: &str = "LOCATION";
/// Name of the optional pinhole-id column.
pub const PINHOLE_ID: &str = "PINHOLE_ID";

#[derive(Debug, Clone, PartialEq)]
pub struct Spot {
    /// Centroid position along image columns, in pixels.
    pub x: f64,
    /// Centroid position along image rows, in pixels.
    pub y: f64,
    /// Fiducial id this spot was identified with (0 = unassigned).
    pub location: u32,
    /// Pinhole id within the fiducial (0 = unassigned).
    pub pinhole_id: u32,
    /// Passthrough column values, aligned with [`SpotTable::extra_columns`].
    pub extra: Vec<String>,
}

impl Spot {
    /// Unlabelled spot at a pixel position.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            location: 0,
            pinhole_id: 0,
            extra: Vec::new(),
        }
    }

    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// Returns `true` once the spot carries a pinhole identity.
    pub fn is_identified(&self) -> bool {
        self.pinhole_id != 0
    }
}

/// All spots of one exposure, plus the names of any passthrough columns.
#[derive(Debug, Clone, Default)]
pub struct SpotTable {
    pub spots: Vec<Spot>,
    pub extra_columns: Vec<String>,
}

impl SpotTable {
    /// Build a table from bare pixel positions.
    pub fn from_positions(positions: &[[f64; 2]]) -> Self {
        Self {
            spots: positions.iter().map(|p| Spot::new(p[0], p[1])).collect(),
            extra_columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn positions(&self) -> Vec<[f64; 2]> {
        self.spots.iter().map(Spot::position).collect()
    }

    /// Number of spots with a nonzero pinhole id.
    pub fn num_identified(&self) -> usize {
        self.spots.iter().filter(|s| s.is_identified()).count()
    }
}

// ── CSV I/O ─────────────────────────────────────────────────────────────────

/// Read a spot table from any CSV reader.
///
/// `XPIX` and `YPIX` are required; `LOCATION` and `PINHOLE_ID` default to 0
/// when absent. All remaining columns are kept as passthrough text.
pub fn read_spots<R: std::io::Read>(reader: R) -> Result<SpotTable> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("reading spot table header")?.clone();

    let find = |name: &str| headers.iter().position(|h| h.trim() == name);
    let Some(ix) = find(XPIX) else {
        bail!("spot table is missing required column {}", XPIX);
    };
    let Some(iy) = find(YPIX) else {
        bail!("spot table is missing required column {}", YPIX);
    };
    let iloc = find(LOCATION);
    let ipin = find(PINHOLE_ID);

    let known = [Some(ix), Some(iy), iloc, ipin];
    let extra_idx: Vec<usize> = (0..headers.len())
        .filter(|i| !known.contains(&Some(*i)))
        .collect();
    let extra_columns = extra_idx
        .iter()
        .map(|&i| headers[i].trim().to_string())
        .collect();

    let mut spots = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading spot row {}", row + 1))?;
        let x = parse_field::<f64>(&record, ix, XPIX, row)?;
        let y = parse_field::<f64>(&record, iy, YPIX, row)?;
        if !x.is_finite() || !y.is_finite() {
            bail!("spot row {} has a non-finite position ({}, {})", row + 1, x, y);
        }
        let location = match iloc {
            Some(i) => parse_field::<u32>(&record, i, LOCATION, row)?,
            None => 0,
        };
        let pinhole_id = match ipin {
            Some(i) => parse_field::<u32>(&record, i, PINHOLE_ID, row)?,
            None => 0,
        };
        let extra = extra_idx
            .iter()
            .map(|&i| record.get(i).unwrap_or("").to_string())
            .collect();
        spots.push(Spot {
            x,
            y,
            location,
            pinhole_id,
            extra,
        });
    }

    Ok(SpotTable {
        spots,
        extra_columns,
    })
}

/// Read a spot table from a CSV file.
pub fn read_spots_csv<P: AsRef<Path>>(path: P) -> Result<SpotTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open spot table {}", path.display()))?;
    read_spots(file).with_context(|| format!("in spot table {}", path.display()))
}

/// Write a spot table as CSV: position and identity columns first, then passthrough.
pub fn write_spots<W: std::io::Write>(writer: W, table: &SpotTable) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![XPIX, YPIX, LOCATION, PINHOLE_ID];
    header.extend(table.extra_columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for spot in &table.spots {
        let mut record = vec![
            spot.x.to_string(),
            spot.y.to_string(),
            spot.location.to_string(),
            spot.pinhole_id.to_string(),
        ];
        record.extend(spot.extra.iter().cloned());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a spot table to a CSV file.
pub fn write_spots_csv<P: AsRef<Path>>(path: P, table: &SpotTable) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("cannot create spot table {}", path.display()))?;
    write_spots(file, table)
}

pub(crate) fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    row: usize,
) -> Result<T> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("row {}: cannot parse {} value {:?}", row + 1, name, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_positions_and_defaults_identity() {
        let data = "XPIX,YPIX,FLUX\n10.5,20.0,300\n-3,4,12\n";
        let table = read_spots(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.extra_columns, vec!["FLUX".to_string()]);
        assert_eq!(table.spots[0].x, 10.5);
        assert_eq!(table.spots[1].y, 4.0);
        assert_eq!(table.spots[1].location, 0);
        assert_eq!(table.spots[1].pinhole_id, 0);
        assert_eq!(table.spots[0].extra, vec!["300".to_string()]);
    }

    #[test]
    fn keeps_existing_identity_columns() {
        let data = "PINHOLE_ID,YPIX,LOCATION,XPIX\n3,2.0,1011,1.0\n";
        let table = read_spots(data.as_bytes()).unwrap();
        assert_eq!(table.spots[0].x, 1.0);
        assert_eq!(table.spots[0].y, 2.0);
        assert_eq!(table.spots[0].location, 1011);
        assert_eq!(table.spots[0].pinhole_id, 3);
        assert!(table.extra_columns.is_empty());
    }

    #[test]
    fn missing_position_column_is_named() {
        let data = "XPIX,FLUX\n1.0,2.0\n";
        let err = read_spots(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("YPIX"), "unexpected error: {err}");
    }

    #[test]
    fn bad_cell_reports_row_and_column() {
        let data = "XPIX,YPIX\n1.0,2.0\n1.0,abc\n";
        let err = read_spots(data.as_bytes()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("row 2") && msg.contains("YPIX"), "unexpected error: {msg}");
    }

    #[test]
    fn written_table_reads_back() {
        let mut table = read_spots("XPIX,YPIX,FLUX\n1.5,2.5,9\n".as_bytes()).unwrap();
        table.spots[0].location = 42;
        table.spots[0].pinhole_id = 4;

        let mut buf = Vec::new();
        write_spots(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("XPIX,YPIX,LOCATION,PINHOLE_ID,FLUX"));

        let back = read_spots(text.as_bytes()).unwrap();
        assert_eq!(back.spots, table.spots);
    }
}
