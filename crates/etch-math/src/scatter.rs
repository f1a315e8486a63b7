//! Scattered-data interpolation onto a rectilinear lattice.
//!
//! Output arrays are indexed `[row, col]` with rows following `axis_y` and
//! columns following `axis_x`. Piecewise methods leave NaN outside the
//! convex hull of the samples; the thin-plate spline extrapolates.

use crate::delaunay::{triangulate, Triangulation};
use crate::linalg::lu_factor;
use etch_types::error::{EtchError, EtchResult};
use ndarray::{Array1, Array2};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::fmt;

/// Barycentric slack for nodes lying on a triangle edge.
const EDGE_TOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterMethod {
    ThinPlateSpline,
    Cubic,
    Linear,
    Nearest,
}

impl fmt::Display for ScatterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScatterMethod::ThinPlateSpline => "thin-plate spline",
            ScatterMethod::Cubic => "cubic",
            ScatterMethod::Linear => "linear",
            ScatterMethod::Nearest => "nearest",
        };
        f.write_str(name)
    }
}

fn check_inputs(points: &[[f64; 2]], values: &[f64]) -> EtchResult<()> {
    if points.len() != values.len() {
        return Err(EtchError::InterpolationFailed(format!(
            "{} points but {} values",
            points.len(),
            values.len()
        )));
    }
    if points.is_empty() {
        return Err(EtchError::InterpolationFailed("no samples".to_string()));
    }
    Ok(())
}

// ── Spatial index ────────────────────────────────────────────────────

/// A sample position tagged with its index in the input slice.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    pos: [f64; 2],
    index: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.pos[0] - point[0];
        let dy = self.pos[1] - point[1];
        dx * dx + dy * dy
    }
}

/// R*-tree over sample positions for nearest-neighbour queries.
#[derive(Debug)]
pub struct SampleIndex {
    tree: RTree<IndexedPoint>,
}

impl SampleIndex {
    pub fn new(points: &[[f64; 2]]) -> Self {
        let entries = points
            .iter()
            .enumerate()
            .map(|(index, &pos)| IndexedPoint { pos, index })
            .collect();
        SampleIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest(&self, x: f64, y: f64) -> Option<usize> {
        self.tree.nearest_neighbor(&[x, y]).map(|p| p.index)
    }

    /// Indices of the `k` closest samples, nearest first.
    pub fn k_nearest(&self, x: f64, y: f64, k: usize) -> Vec<usize> {
        self.tree
            .nearest_neighbor_iter(&[x, y])
            .take(k)
            .map(|p| p.index)
            .collect()
    }
}

// ── Nearest ──────────────────────────────────────────────────────────

pub fn nearest_grid(
    points: &[[f64; 2]],
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
) -> EtchResult<Array2<f64>> {
    check_inputs(points, values)?;
    let index = SampleIndex::new(points);
    let mut out = Array2::from_elem((axis_y.len(), axis_x.len()), f64::NAN);
    for (i, &y) in axis_y.iter().enumerate() {
        for (j, &x) in axis_x.iter().enumerate() {
            if let Some(k) = index.nearest(x, y) {
                out[[i, j]] = values[k];
            }
        }
    }
    Ok(out)
}

// ── Piecewise on a triangulation ─────────────────────────────────────

/// Visit every lattice node inside triangle `t` with its barycentric weights.
fn rasterize<F: FnMut(usize, usize, [f64; 3])>(
    tri: &Triangulation,
    t: usize,
    axis_x: &[f64],
    axis_y: &[f64],
    mut visit: F,
) {
    let (min_x, min_y, max_x, max_y) = tri.bounds(t);
    let span = (max_x - min_x).max(max_y - min_y);
    let pad = EDGE_TOL * span.max(1.0);
    let j_lo = axis_x.partition_point(|&x| x < min_x - pad);
    let j_hi = axis_x.partition_point(|&x| x <= max_x + pad);
    let i_lo = axis_y.partition_point(|&y| y < min_y - pad);
    let i_hi = axis_y.partition_point(|&y| y <= max_y + pad);
    for i in i_lo..i_hi {
        for j in j_lo..j_hi {
            let l = tri.barycentric(t, axis_x[j], axis_y[i]);
            if l.iter().all(|&w| w >= -EDGE_TOL) {
                visit(i, j, l);
            }
        }
    }
}

/// Barycentric (piecewise-planar) interpolation. NaN outside the hull.
pub fn linear_grid(
    tri: &Triangulation,
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
) -> EtchResult<Array2<f64>> {
    check_inputs(&tri.points, values)?;
    let mut out = Array2::from_elem((axis_y.len(), axis_x.len()), f64::NAN);
    for t in 0..tri.triangles.len() {
        let [a, b, c] = tri.triangles[t];
        rasterize(tri, t, axis_x, axis_y, |i, j, l| {
            out[[i, j]] = l[0] * values[a] + l[1] * values[b] + l[2] * values[c];
        });
    }
    Ok(out)
}

/// Vertex gradients by inverse-square-distance weighted least squares over
/// the triangulation neighbours. Vertices whose neighbours are collinear get
/// a zero gradient.
pub fn estimate_gradients(tri: &Triangulation, values: &[f64]) -> Vec<[f64; 2]> {
    let nbrs = tri.vertex_neighbors();
    nbrs.iter()
        .enumerate()
        .map(|(v, list)| {
            let [px, py] = tri.points[v];
            let (mut sxx, mut sxy, mut syy, mut bx, mut by) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for &u in list {
                let dx = tri.points[u][0] - px;
                let dy = tri.points[u][1] - py;
                let d2 = dx * dx + dy * dy;
                if d2 <= 0.0 {
                    continue;
                }
                let w = 1.0 / d2;
                let df = values[u] - values[v];
                sxx += w * dx * dx;
                sxy += w * dx * dy;
                syy += w * dy * dy;
                bx += w * dx * df;
                by += w * dy * df;
            }
            let det = sxx * syy - sxy * sxy;
            if det.abs() <= 1e-12 * (sxx * syy).abs().max(1e-300) {
                return [0.0, 0.0];
            }
            [(syy * bx - sxy * by) / det, (sxx * by - sxy * bx) / det]
        })
        .collect()
}

/// Cubic Bézier patch per triangle, built from vertex values and gradients.
/// Continuous across shared edges; reproduces linear data exactly.
pub fn cubic_grid(
    tri: &Triangulation,
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
) -> EtchResult<Array2<f64>> {
    check_inputs(&tri.points, values)?;
    let grads = estimate_gradients(tri, values);
    let mut out = Array2::from_elem((axis_y.len(), axis_x.len()), f64::NAN);

    for t in 0..tri.triangles.len() {
        let [a, b, c] = tri.triangles[t];
        let p = [tri.points[a], tri.points[b], tri.points[c]];
        let f = [values[a], values[b], values[c]];
        let g = [grads[a], grads[b], grads[c]];
        // Edge control point next to vertex `from`, one third towards `to`
        let edge = |from: usize, to: usize| -> f64 {
            let dx = p[to][0] - p[from][0];
            let dy = p[to][1] - p[from][1];
            f[from] + (g[from][0] * dx + g[from][1] * dy) / 3.0
        };
        let b210 = edge(0, 1);
        let b120 = edge(1, 0);
        let b021 = edge(1, 2);
        let b012 = edge(2, 1);
        let b102 = edge(2, 0);
        let b201 = edge(0, 2);
        let e = (b210 + b120 + b021 + b012 + b102 + b201) / 6.0;
        let v = (f[0] + f[1] + f[2]) / 3.0;
        let b111 = e + (e - v) / 2.0;

        rasterize(tri, t, axis_x, axis_y, |i, j, l| {
            let (u, v, w) = (l[0], l[1], l[2]);
            out[[i, j]] = f[0] * u * u * u
                + f[1] * v * v * v
                + f[2] * w * w * w
                + 3.0 * b210 * u * u * v
                + 3.0 * b120 * u * v * v
                + 3.0 * b021 * v * v * w
                + 3.0 * b012 * v * w * w
                + 3.0 * b102 * u * w * w
                + 3.0 * b201 * u * u * w
                + 6.0 * b111 * u * v * w;
        });
    }
    Ok(out)
}

/// Triangulate and run `linear_grid` in one call.
pub fn linear_scatter(
    points: &[[f64; 2]],
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
) -> EtchResult<Array2<f64>> {
    check_inputs(points, values)?;
    linear_grid(&triangulate(points)?, values, axis_x, axis_y)
}

/// Triangulate and run `cubic_grid` in one call.
pub fn cubic_scatter(
    points: &[[f64; 2]],
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
) -> EtchResult<Array2<f64>> {
    check_inputs(points, values)?;
    cubic_grid(&triangulate(points)?, values, axis_x, axis_y)
}

// ── Thin-plate spline ────────────────────────────────────────────────

/// φ(r) = r² ln r with φ(0) = 0.
pub fn thin_plate_kernel(r: f64) -> f64 {
    if r <= 0.0 {
        0.0
    } else {
        r * r * r.ln()
    }
}

/// One solved thin-plate-spline system with a degree-1 polynomial tail.
/// The polynomial is evaluated on coordinates shifted to the centre of the
/// sample bounding box and scaled by its half-extent.
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    centers: Vec<[f64; 2]>,
    weights: Array1<f64>,
    poly: [f64; 3],
    shift: [f64; 2],
    scale: [f64; 2],
}

impl ThinPlateSpline {
    pub fn fit(centers: &[[f64; 2]], values: &[f64]) -> EtchResult<Self> {
        check_inputs(centers, values)?;
        let n = centers.len();
        if n < 3 {
            return Err(EtchError::InterpolationFailed(format!(
                "thin-plate spline with a linear tail needs 3 points, got {n}"
            )));
        }

        let mut lo = [f64::INFINITY; 2];
        let mut hi = [f64::NEG_INFINITY; 2];
        for c in centers {
            for d in 0..2 {
                lo[d] = lo[d].min(c[d]);
                hi[d] = hi[d].max(c[d]);
            }
        }
        let shift = [(lo[0] + hi[0]) / 2.0, (lo[1] + hi[1]) / 2.0];
        let mut scale = [(hi[0] - lo[0]) / 2.0, (hi[1] - lo[1]) / 2.0];
        for s in scale.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        let m = n + 3;
        let mut lhs = Array2::zeros((m, m));
        let mut rhs = Array1::zeros(m);
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = centers[i][0] - centers[j][0];
                let dy = centers[i][1] - centers[j][1];
                let k = thin_plate_kernel((dx * dx + dy * dy).sqrt());
                lhs[[i, j]] = k;
                lhs[[j, i]] = k;
            }
            let mono = [
                1.0,
                (centers[i][0] - shift[0]) / scale[0],
                (centers[i][1] - shift[1]) / scale[1],
            ];
            for (d, &mv) in mono.iter().enumerate() {
                lhs[[i, n + d]] = mv;
                lhs[[n + d, i]] = mv;
            }
            rhs[i] = values[i];
        }

        let coeffs = lu_factor(&lhs)
            .map_err(|e| EtchError::InterpolationFailed(format!("thin-plate system: {e}")))?
            .solve(&rhs)?;
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(EtchError::InterpolationFailed(
                "thin-plate coefficients are not finite".to_string(),
            ));
        }

        Ok(ThinPlateSpline {
            centers: centers.to_vec(),
            weights: coeffs.slice(ndarray::s![..n]).to_owned(),
            poly: [coeffs[n], coeffs[n + 1], coeffs[n + 2]],
            shift,
            scale,
        })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let mut acc = self.poly[0]
            + self.poly[1] * (x - self.shift[0]) / self.scale[0]
            + self.poly[2] * (y - self.shift[1]) / self.scale[1];
        for (c, &w) in self.centers.iter().zip(self.weights.iter()) {
            let dx = x - c[0];
            let dy = y - c[1];
            acc += w * thin_plate_kernel((dx * dx + dy * dy).sqrt());
        }
        acc
    }
}

/// Thin-plate-spline interpolation using the `neighbors` nearest samples of
/// each lattice node. Nodes sharing a neighbour set share one solve.
pub fn thin_plate_grid(
    points: &[[f64; 2]],
    values: &[f64],
    axis_x: &[f64],
    axis_y: &[f64],
    neighbors: usize,
) -> EtchResult<Array2<f64>> {
    check_inputs(points, values)?;
    let k = neighbors.min(points.len());
    if k < 3 {
        return Err(EtchError::InterpolationFailed(format!(
            "thin-plate spline needs at least 3 neighbours, got {k}"
        )));
    }

    let mut out = Array2::zeros((axis_y.len(), axis_x.len()));

    if k == points.len() {
        let spline = ThinPlateSpline::fit(points, values)?;
        for (i, &y) in axis_y.iter().enumerate() {
            for (j, &x) in axis_x.iter().enumerate() {
                out[[i, j]] = spline.evaluate(x, y);
            }
        }
        return Ok(out);
    }

    let index = SampleIndex::new(points);
    let mut cache: HashMap<Vec<usize>, ThinPlateSpline> = HashMap::new();
    for (i, &y) in axis_y.iter().enumerate() {
        for (j, &x) in axis_x.iter().enumerate() {
            let mut key = index.k_nearest(x, y, k);
            key.sort_unstable();
            if !cache.contains_key(&key) {
                let centers: Vec<[f64; 2]> = key.iter().map(|&s| points[s]).collect();
                let local: Vec<f64> = key.iter().map(|&s| values[s]).collect();
                let spline = ThinPlateSpline::fit(&centers, &local)?;
                cache.insert(key.clone(), spline);
            }
            if let Some(spline) = cache.get(&key) {
                out[[i, j]] = spline.evaluate(x, y);
            }
        }
    }
    log::debug!(
        "thin-plate spline: {} local systems for {} nodes",
        cache.len(),
        axis_x.len() * axis_y.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_points(n: usize, radius: f64) -> Vec<[f64; 2]> {
        let mut pts = vec![[0.0, 0.0]];
        for k in 0..n {
            let a = 2.0 * std::f64::consts::PI * k as f64 / n as f64;
            pts.push([radius * a.cos(), radius * a.sin()]);
        }
        pts
    }

    fn axis(lo: f64, hi: f64, n: usize) -> Vec<f64> {
        Array1::linspace(lo, hi, n).to_vec()
    }

    #[test]
    fn test_nearest_picks_closest() {
        let pts = [[0.0, 0.0], [10.0, 0.0]];
        let out = nearest_grid(&pts, &[1.0, 2.0], &[1.0, 9.0], &[0.0]).unwrap();
        assert_eq!(out[[0, 0]], 1.0);
        assert_eq!(out[[0, 1]], 2.0);
    }

    #[test]
    fn test_k_nearest_order() {
        let idx = SampleIndex::new(&[[0.0, 0.0], [5.0, 0.0], [1.0, 0.0]]);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.k_nearest(0.2, 0.0, 2), vec![0, 2]);
    }

    #[test]
    fn test_linear_reproduces_plane() {
        let pts = ring_points(8, 10.0);
        let vals: Vec<f64> = pts.iter().map(|p| 3.0 + 2.0 * p[0] - p[1]).collect();
        let ax = axis(-5.0, 5.0, 11);
        let out = linear_scatter(&pts, &vals, &ax, &ax).unwrap();
        for (i, &y) in ax.iter().enumerate() {
            for (j, &x) in ax.iter().enumerate() {
                let expected = 3.0 + 2.0 * x - y;
                assert!(
                    (out[[i, j]] - expected).abs() < 1e-9,
                    "({x}, {y}): {} vs {expected}",
                    out[[i, j]]
                );
            }
        }
    }

    #[test]
    fn test_linear_nan_outside_hull() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let out = linear_scatter(&pts, &[1.0, 1.0, 1.0], &[5.0], &[5.0]).unwrap();
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn test_cubic_reproduces_plane() {
        let pts = ring_points(12, 20.0);
        let vals: Vec<f64> = pts.iter().map(|p| 1000.0 + 0.5 * p[0] + 0.25 * p[1]).collect();
        let ax = axis(-10.0, 10.0, 9);
        let out = cubic_scatter(&pts, &vals, &ax, &ax).unwrap();
        for (i, &y) in ax.iter().enumerate() {
            for (j, &x) in ax.iter().enumerate() {
                let expected = 1000.0 + 0.5 * x + 0.25 * y;
                assert!((out[[i, j]] - expected).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_cubic_hits_sample_values() {
        let pts = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]];
        let vals = [1.0, 4.0, 2.0, 9.0];
        let out = cubic_scatter(&pts, &vals, &[0.0, 10.0], &[0.0, 10.0]).unwrap();
        assert!((out[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((out[[0, 1]] - 4.0).abs() < 1e-9);
        assert!((out[[1, 0]] - 2.0).abs() < 1e-9);
        assert!((out[[1, 1]] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_tps_interpolates_samples() {
        let pts = ring_points(10, 30.0);
        let vals: Vec<f64> = pts
            .iter()
            .map(|p| 1800.0 + 0.01 * (p[0] * p[0] + p[1] * p[1]))
            .collect();
        let spline = ThinPlateSpline::fit(&pts, &vals).unwrap();
        for (p, &v) in pts.iter().zip(vals.iter()) {
            assert!(
                (spline.evaluate(p[0], p[1]) - v).abs() < 1e-6,
                "spline does not pass through sample at {p:?}"
            );
        }
    }

    #[test]
    fn test_tps_reproduces_plane_everywhere() {
        let pts = ring_points(7, 25.0);
        let vals: Vec<f64> = pts.iter().map(|p| 50.0 - p[0] + 2.0 * p[1]).collect();
        let ax = axis(-60.0, 60.0, 7);
        let out = thin_plate_grid(&pts, &vals, &ax, &ax, 200).unwrap();
        for (i, &y) in ax.iter().enumerate() {
            for (j, &x) in ax.iter().enumerate() {
                assert!((out[[i, j]] - (50.0 - x + 2.0 * y)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_tps_local_neighbourhoods() {
        let pts = ring_points(15, 40.0);
        let vals: Vec<f64> = pts.iter().map(|p| 10.0 + 0.1 * p[0]).collect();
        let ax = axis(-40.0, 40.0, 9);
        let out = thin_plate_grid(&pts, &vals, &ax, &ax, pts.len() - 1).unwrap();
        for (i, _) in ax.iter().enumerate() {
            for (j, &x) in ax.iter().enumerate() {
                assert!((out[[i, j]] - (10.0 + 0.1 * x)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_tps_rejects_two_neighbours() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let r = thin_plate_grid(&pts, &[1.0, 2.0, 3.0], &[0.0], &[0.0], 2);
        assert!(matches!(r, Err(EtchError::InterpolationFailed(_))));
    }

    #[test]
    fn test_tps_collinear_fails() {
        let pts = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        assert!(ThinPlateSpline::fit(&pts, &[1.0, 2.0, 3.0, 4.0]).is_err());
    }

    #[test]
    fn test_kernel_values() {
        assert_eq!(thin_plate_kernel(0.0), 0.0);
        assert_eq!(thin_plate_kernel(1.0), 0.0);
        assert!((thin_plate_kernel(2.0) - 4.0 * 2.0_f64.ln()).abs() < 1e-15);
    }
}
