//! Planar spatial index for nearest-neighbour queries over pixel positions.
//!
//! `SpotIndex` bins points into a uniform square grid laid over their
//! bounding box. Each cell maps to a compact slice of point indices
//! (`cell_offsets` / `point_indices`), so a query only scans the cells that
//! can hold an answer.
//!
//! Query flow:
//! 1. Locate the query's cell (which may lie outside the grid).
//! 2. Scan square rings of cells around it, nearest ring first.
//! 3. Stop once the next ring cannot contain anything closer than the
//!    current k-th best, or once it lies beyond the search radius.
//!
//! Search cost stays close to local point density instead of total count.

/// Upper bound on grid cells per indexed point. Sparse layouts with a small
/// requested cell size get a coarser grid instead of millions of empty cells.
const MAX_CELLS_PER_POINT: usize = 4;

#[derive(Debug, Clone)]
pub struct SpotIndex {
    points: Vec<[f64; 2]>,
    origin: [f64; 2],
    cell_size: f64,
    n_x: usize,
    n_y: usize,
    cell_offsets: Vec<u32>,
    point_indices: Vec<u32>,
}

/// A query hit: index into the indexed points and Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f64,
}

impl SpotIndex {
    /// Build an index with the requested cell size (pixels).
    ///
    /// A good cell size is the typical query radius. Non-positive or
    /// non-finite sizes fall back to an automatic choice.
    pub fn new(cell_size: f64, points: &[[f64; 2]]) -> Self {
        let (origin, extent) = bounding_box(points);
        let mut cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            auto_cell_size(extent, points.len())
        };

        let max_cells = (MAX_CELLS_PER_POINT * points.len()).max(1);
        let (mut n_x, mut n_y) = grid_dims(extent, cell_size);
        while n_x * n_y > max_cells {
            cell_size *= 2.0;
            (n_x, n_y) = grid_dims(extent, cell_size);
        }

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_x * n_y];
        for (idx, p) in points.iter().enumerate() {
            let (cx, cy) = cell_coords(origin, cell_size, *p);
            let cx = (cx.max(0) as usize).min(n_x - 1);
            let cy = (cy.max(0) as usize).min(n_y - 1);
            bins[cy * n_x + cx].push(idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(bins.len() + 1);
        let mut point_indices = Vec::with_capacity(points.len());
        cell_offsets.push(0);
        for bin in bins {
            point_indices.extend(bin);
            cell_offsets.push(point_indices.len() as u32);
        }

        Self {
            points: points.to_vec(),
            origin,
            cell_size,
            n_x,
            n_y,
            cell_offsets,
            point_indices,
        }
    }

    /// Build an index with a cell size derived from point density.
    pub fn from_points(points: &[[f64; 2]]) -> Self {
        Self::new(0.0, points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Single nearest point to `query`, with no distance limit.
    ///
    /// Ties resolve to the lowest point index.
    pub fn nearest(&self, query: [f64; 2]) -> Option<Neighbor> {
        self.k_nearest_within(query, 1, f64::INFINITY).into_iter().next()
    }

    /// Up to `k` nearest points strictly closer than `radius`, sorted by
    /// ascending distance (then index).
    ///
    /// A point queried against its own index is returned as its own first
    /// neighbour at distance zero.
    pub fn k_nearest_within(&self, query: [f64; 2], k: usize, radius: f64) -> Vec<Neighbor> {
        if self.is_empty() || k == 0 || radius.is_nan() || radius <= 0.0 {
            return Vec::new();
        }

        let (qx, qy) = cell_coords(self.origin, self.cell_size, query);
        let first_ring = ring_to_reach_grid(qx, qy, self.n_x, self.n_y);
        let last_ring = ring_to_cover_grid(qx, qy, self.n_x, self.n_y);

        let mut best: Vec<Neighbor> = Vec::with_capacity(k + 1);
        for ring in first_ring..=last_ring {
            // Any point in this ring is at least (ring - 1) cells away.
            let ring_min_dist = (ring.saturating_sub(1)) as f64 * self.cell_size;
            if ring_min_dist >= radius {
                break;
            }
            if best.len() == k && ring_min_dist > best[k - 1].distance {
                break;
            }
            self.for_each_ring_cell(qx, qy, ring, |cell| {
                self.collect_cell(cell, query, k, radius, &mut best);
            });
        }
        best
    }

    fn collect_cell(
        &self,
        cell: usize,
        query: [f64; 2],
        k: usize,
        radius: f64,
        best: &mut Vec<Neighbor>,
    ) {
        let start = self.cell_offsets[cell] as usize;
        let end = self.cell_offsets[cell + 1] as usize;
        for &idx in &self.point_indices[start..end] {
            let index = idx as usize;
            let p = self.points[index];
            let distance = ((p[0] - query[0]).powi(2) + (p[1] - query[1]).powi(2)).sqrt();
            // NaN coordinates never count as in range.
            if distance.is_nan() || distance >= radius {
                continue;
            }
            if best.len() == k && !closer(distance, index, &best[k - 1]) {
                continue;
            }
            let pos = best
                .iter()
                .position(|b| closer(distance, index, b))
                .unwrap_or(best.len());
            best.insert(pos, Neighbor { index, distance });
            best.truncate(k);
        }
    }

    /// Visit the in-grid cells on the square ring at Chebyshev distance `ring`
    /// from cell `(cx, cy)`.
    fn for_each_ring_cell<F>(&self, cx: i64, cy: i64, ring: usize, mut f: F)
    where
        F: FnMut(usize),
    {
        let r = ring as i64;
        let (n_x, n_y) = (self.n_x as i64, self.n_y as i64);
        let cell = |x: i64, y: i64| (y * n_x + x) as usize;
        if r == 0 {
            if cx >= 0 && cx < n_x && cy >= 0 && cy < n_y {
                f(cell(cx, cy));
            }
            return;
        }

        // Top and bottom rows of the ring, clipped to the grid.
        let x_lo = (cx - r).max(0);
        let x_hi = (cx + r).min(n_x - 1);
        for y in [cy - r, cy + r] {
            if y >= 0 && y < n_y {
                for x in x_lo..=x_hi {
                    f(cell(x, y));
                }
            }
        }

        // Left and right columns, excluding the corners visited above.
        let y_lo = (cy - r + 1).max(0);
        let y_hi = (cy + r - 1).min(n_y - 1);
        for x in [cx - r, cx + r] {
            if x >= 0 && x < n_x {
                for y in y_lo..=y_hi {
                    f(cell(x, y));
                }
            }
        }
    }
}

fn closer(distance: f64, index: usize, other: &Neighbor) -> bool {
    distance < other.distance || (distance == other.distance && index < other.index)
}

fn bounding_box(points: &[[f64; 2]]) -> ([f64; 2], [f64; 2]) {
    if points.is_empty() {
        return ([0.0, 0.0], [0.0, 0.0]);
    }
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for p in points {
        for d in 0..2 {
            min[d] = min[d].min(p[d]);
            max[d] = max[d].max(p[d]);
        }
    }
    (min, [max[0] - min[0], max[1] - min[1]])
}

/// Roughly one point per cell for a uniform layout.
fn auto_cell_size(extent: [f64; 2], n: usize) -> f64 {
    let area = extent[0].max(1.0) * extent[1].max(1.0);
    (area / n.max(1) as f64).sqrt().max(1.0)
}

fn grid_dims(extent: [f64; 2], cell_size: f64) -> (usize, usize) {
    let n_x = (extent[0] / cell_size).floor() as usize + 1;
    let n_y = (extent[1] / cell_size).floor() as usize + 1;
    (n_x, n_y)
}

fn cell_coords(origin: [f64; 2], cell_size: f64, p: [f64; 2]) -> (i64, i64) {
    let cx = ((p[0] - origin[0]) / cell_size).floor();
    let cy = ((p[1] - origin[1]) / cell_size).floor();
    (clamp_cell(cx), clamp_cell(cy))
}

fn clamp_cell(c: f64) -> i64 {
    // Keeps far-away or non-finite queries from overflowing ring arithmetic.
    const LIMIT: f64 = 1e12;
    if c.is_nan() {
        0
    } else {
        c.clamp(-LIMIT, LIMIT) as i64
    }
}

/// Chebyshev distance (in cells) from `(cx, cy)` to the nearest grid cell.
fn ring_to_reach_grid(cx: i64, cy: i64, n_x: usize, n_y: usize) -> usize {
    let gap = |c: i64, n: usize| -> i64 {
        if c < 0 {
            -c
        } else if c >= n as i64 {
            c - (n as i64 - 1)
        } else {
            0
        }
    };
    gap(cx, n_x).max(gap(cy, n_y)) as usize
}

/// Chebyshev distance (in cells) from `(cx, cy)` to the farthest grid cell.
fn ring_to_cover_grid(cx: i64, cy: i64, n_x: usize, n_y: usize) -> usize {
    let far = |c: i64, n: usize| -> i64 { c.abs().max((n as i64 - 1 - c).abs()) };
    far(cx, n_x).max(far(cy, n_y)) as usize
}
