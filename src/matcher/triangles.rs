//! Similarity-invariant triangle descriptors.
//!
//! Every triple of a small point set is described by two numbers that do not
//! change under rotation, translation or uniform scaling:
//!
//! - `ratio`: longest side over shortest side, always ≥ 1;
//! - `cosine`: cosine of the angle at vertex 0, in [-1, 1].
//!
//! Vertices are put in a canonical order derived from the side lengths:
//! vertex 0 touches the shortest and longest sides, vertex 1 the shortest and
//! middle sides, vertex 2 the middle and longest sides. When two sides have
//! the same length that rule leaves two candidate orders, and the
//! counter-clockwise one is taken. Handedness is otherwise not encoded, so a
//! triangle and its mirror image share a descriptor.

/// Side endpoints, in the order the three side lengths are listed.
const SIDES: [[usize; 2]; 3] = [[0, 1], [1, 2], [0, 2]];

/// Relative tolerance under which two squared side lengths count as equal.
const SIDE_TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Point indices in canonical vertex order.
    pub indices: [usize; 3],
    /// Longest over shortest side length. `+∞` for a degenerate triangle.
    pub ratio: f64,
    /// Cosine of the angle at vertex 0. `1` for a degenerate triangle.
    pub cosine: f64,
}

impl Triangle {
    /// Describe the triangle formed by points `i`, `j` and `k` of `points`.
    pub fn from_points(points: &[[f64; 2]], i: usize, j: usize, k: usize) -> Self {
        let ijk = [i, j, k];
        let p = [points[i], points[j], points[k]];
        let len2: [f64; 3] = SIDES.map(|[a, b]| dist2(p[a], p[b]));

        // Stable, so equal sides keep their listing order.
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| len2[a].total_cmp(&len2[b]));
        let [shortest, middle, longest] = order;

        let mut v = [
            shared_vertex(SIDES[shortest], SIDES[longest]),
            shared_vertex(SIDES[shortest], SIDES[middle]),
            shared_vertex(SIDES[middle], SIDES[longest]),
        ];

        let (s, m, l) = (len2[shortest], len2[middle], len2[longest]);
        if s <= 0.0 || !s.is_finite() || !l.is_finite() {
            return Self {
                indices: v.map(|x| ijk[x]),
                ratio: f64::INFINITY,
                cosine: 1.0,
            };
        }

        // Swapping two tied sides mirrors the vertex order without changing
        // ratio or cosine.
        if cross(p[v[0]], p[v[1]], p[v[2]]) < 0.0 {
            if m - s <= SIDE_TIE_TOLERANCE * l {
                v.swap(0, 2);
            } else if l - m <= SIDE_TIE_TOLERANCE * l {
                v.swap(0, 1);
            }
        }
        let [v0, v1, v2] = v;
        let indices = v.map(|x| ijk[x]);

        let a = [p[v1][0] - p[v0][0], p[v1][1] - p[v0][1]];
        let b = [p[v2][0] - p[v0][0], p[v2][1] - p[v0][1]];
        let dot = a[0] * b[0] + a[1] * b[1];
        let norm = ((a[0] * a[0] + a[1] * a[1]) * (b[0] * b[0] + b[1] * b[1])).sqrt();

        Self {
            indices,
            ratio: (l / s).sqrt(),
            cosine: (dot / norm).clamp(-1.0, 1.0),
        }
    }

    /// Unit vector from vertex 0 to vertex 1 (the shortest side).
    pub fn first_side_direction(&self, points: &[[f64; 2]]) -> [f64; 2] {
        let a = points[self.indices[0]];
        let b = points[self.indices[1]];
        let d = [b[0] - a[0], b[1] - a[1]];
        let n = (d[0] * d[0] + d[1] * d[1]).sqrt();
        if n > 0.0 {
            [d[0] / n, d[1] / n]
        } else {
            [0.0, 0.0]
        }
    }
}

/// All `C(m, 3)` triangles of a point set, triples in lexicographic order.
pub fn compute_triangles(points: &[[f64; 2]]) -> Vec<Triangle> {
    let m = points.len();
    let mut triangles = Vec::with_capacity(num_triangles(m));
    for i in 0..m {
        for j in (i + 1)..m {
            for k in (j + 1)..m {
                triangles.push(Triangle::from_points(points, i, j, k));
            }
        }
    }
    triangles
}

/// Number of triangles in a set of `m` points.
pub fn num_triangles(m: usize) -> usize {
    if m < 3 {
        0
    } else {
        m * (m - 1) * (m - 2) / 6
    }
}

#[inline]
fn dist2(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    dx * dx + dy * dy
}

/// z component of `(b - a) × (c - a)`; positive when a, b, c turn counter-clockwise.
#[inline]
fn cross(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// The local vertex (0, 1 or 2) two distinct sides have in common.
#[inline]
fn shared_vertex(a: [usize; 2], b: [usize; 2]) -> usize {
    if a[0] == b[0] || a[0] == b[1] {
        a[0]
    } else {
        a[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pentagon_ish() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [3.1, 0.4], [1.2, 2.9], [-1.7, 1.3], [0.8, -2.2]]
    }

    #[test]
    fn enumerates_all_triples() {
        for m in 0..7 {
            let points: Vec<[f64; 2]> = (0..m).map(|i| [i as f64, (i * i) as f64]).collect();
            let tris = compute_triangles(&points);
            assert_eq!(tris.len(), num_triangles(m), "m = {m}");
        }
        assert_eq!(num_triangles(5), 10);
    }

    #[test]
    fn features_are_bounded() {
        for t in compute_triangles(&pentagon_ish()) {
            assert!(t.ratio >= 1.0, "ratio {} < 1", t.ratio);
            assert!((-1.0..=1.0).contains(&t.cosine), "cosine {} out of range", t.cosine);
            let mut sorted = t.indices;
            sorted.sort_unstable();
            assert!(sorted[0] < sorted[1] && sorted[1] < sorted[2]);
        }
    }

    #[test]
    fn canonical_order_of_a_right_triangle() {
        // Sides 3 (0-1), 4 (0-2), 5 (1-2).
        let points = [[0.0, 0.0], [3.0, 0.0], [0.0, 4.0]];
        let t = Triangle::from_points(&points, 0, 1, 2);
        assert_eq!(t.indices, [1, 0, 2]);
        assert!((t.ratio - 5.0 / 3.0).abs() < 1e-12);
        assert!((t.cosine - 0.6).abs() < 1e-12, "cos at vertex 1 = 3/5, got {}", t.cosine);
        assert_eq!(t.first_side_direction(&points), [-1.0, 0.0]);
    }

    #[test]
    fn tied_sides_take_counter_clockwise_order() {
        // Right isosceles: legs 0-1 and 0-2 are tied.
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        for (i, j, k) in [(0, 1, 2), (0, 2, 1), (1, 0, 2), (2, 1, 0)] {
            let t = Triangle::from_points(&points, i, j, k);
            let [a, b, c] = t.indices.map(|n| points[n]);
            assert!(cross(a, b, c) > 0.0, "order {:?} is clockwise", t.indices);
            assert!((t.ratio - 2f64.sqrt()).abs() < 1e-12);
            assert!((t.cosine - 0.5f64.sqrt()).abs() < 1e-12);
            assert_eq!(t.indices[1], 0, "right angle is vertex 1");
        }
    }

    #[test]
    fn invariant_under_similarity() {
        let points = pentagon_ish();
        let (angle, scale, tx, ty) = (0.83_f64, 2.7, -140.0, 55.5);
        let (s, c) = angle.sin_cos();
        let moved: Vec<[f64; 2]> = points
            .iter()
            .map(|p| [scale * (c * p[0] - s * p[1]) + tx, scale * (s * p[0] + c * p[1]) + ty])
            .collect();

        let before = compute_triangles(&points);
        let after = compute_triangles(&moved);
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.indices, b.indices);
            assert!((a.ratio - b.ratio).abs() < 1e-9);
            assert!((a.cosine - b.cosine).abs() < 1e-9);
        }
    }

    #[test]
    fn degenerate_triangle_is_flagged() {
        let points = [[1.0, 1.0], [1.0, 1.0], [4.0, 5.0]];
        let t = Triangle::from_points(&points, 0, 1, 2);
        assert!(t.ratio.is_infinite());
        assert_eq!(t.cosine, 1.0);
    }
}
