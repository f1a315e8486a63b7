//! Planar Delaunay triangulation (Bowyer–Watson).
//!
//! Coordinates are normalized to the unit box before insertion so the
//! circumcircle tests stay well conditioned for millimetre-scale inputs.

use etch_types::error::{EtchError, EtchResult};
use std::collections::HashMap;

/// Half-size of the enclosing super-triangle in normalized units.
const SUPER_SCALE: f64 = 50.0;

/// Triangles with |2·area| below this (normalized units) are dropped.
const DEGENERATE_AREA: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct Cell {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

fn circumcircle(p: &[[f64; 2]], v: [usize; 3]) -> Option<(f64, f64, f64)> {
    let [ax, ay] = p[v[0]];
    let [bx, by] = p[v[1]];
    let [cx, cy] = p[v[2]];
    let d = 2.0 * (ax * (by - cy) + bx * (cy - ay) + cx * (ay - by));
    if d.abs() < 1e-18 {
        return None;
    }
    let a2 = ax * ax + ay * ay;
    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (a2 * (by - cy) + b2 * (cy - ay) + c2 * (ay - by)) / d;
    let uy = (a2 * (cx - bx) + b2 * (ax - cx) + c2 * (bx - ax)) / d;
    let r2 = (ax - ux) * (ax - ux) + (ay - uy) * (ay - uy);
    Some((ux, uy, r2))
}

fn orient(p: &[[f64; 2]], v: [usize; 3]) -> f64 {
    let [ax, ay] = p[v[0]];
    let [bx, by] = p[v[1]];
    let [cx, cy] = p[v[2]];
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

/// Triangle mesh over the input points. Vertex indices refer to the input
/// slice; every triangle is counter-clockwise.
#[derive(Debug, Clone)]
pub struct Triangulation {
    pub points: Vec<[f64; 2]>,
    pub triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Barycentric coordinates of `(x, y)` in triangle `t`.
    pub fn barycentric(&self, t: usize, x: f64, y: f64) -> [f64; 3] {
        let [a, b, c] = self.triangles[t];
        let [ax, ay] = self.points[a];
        let [bx, by] = self.points[b];
        let [cx, cy] = self.points[c];
        let det = (by - cy) * (ax - cx) + (cx - bx) * (ay - cy);
        let l1 = ((by - cy) * (x - cx) + (cx - bx) * (y - cy)) / det;
        let l2 = ((cy - ay) * (x - cx) + (ax - cx) * (y - cy)) / det;
        [l1, l2, 1.0 - l1 - l2]
    }

    /// Axis-aligned bounds of triangle `t`: (min_x, min_y, max_x, max_y).
    pub fn bounds(&self, t: usize) -> (f64, f64, f64, f64) {
        let tri = self.triangles[t];
        let mut b = (
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for &v in &tri {
            let [x, y] = self.points[v];
            b.0 = b.0.min(x);
            b.1 = b.1.min(y);
            b.2 = b.2.max(x);
            b.3 = b.3.max(y);
        }
        b
    }

    /// Sorted, de-duplicated neighbour list of every vertex.
    pub fn vertex_neighbors(&self) -> Vec<Vec<usize>> {
        let mut nbrs = vec![Vec::new(); self.points.len()];
        for tri in &self.triangles {
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                nbrs[a].push(b);
                nbrs[b].push(a);
            }
        }
        for list in nbrs.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }
        nbrs
    }
}

/// Delaunay triangulation of distinct points.
///
/// Fails with `InterpolationFailed` for fewer than three points or when all
/// points are collinear.
pub fn triangulate(points: &[[f64; 2]]) -> EtchResult<Triangulation> {
    let n = points.len();
    if n < 3 {
        return Err(EtchError::InterpolationFailed(format!(
            "triangulation needs at least 3 points, got {n}"
        )));
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &[x, y] in points {
        if !x.is_finite() || !y.is_finite() {
            return Err(EtchError::InterpolationFailed(
                "non-finite sample coordinate".to_string(),
            ));
        }
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let delta = (max_x - min_x).max(max_y - min_y);
    if delta <= 0.0 {
        return Err(EtchError::InterpolationFailed(
            "all samples share one position".to_string(),
        ));
    }

    // Normalized copy with the three super-triangle vertices appended
    let mut p: Vec<[f64; 2]> = points
        .iter()
        .map(|&[x, y]| [(x - min_x) / delta, (y - min_y) / delta])
        .collect();
    p.push([-SUPER_SCALE, -SUPER_SCALE]);
    p.push([SUPER_SCALE * 2.0, -SUPER_SCALE]);
    p.push([0.5, SUPER_SCALE * 2.0]);
    let sup = [n, n + 1, n + 2];

    let mut cells: Vec<Cell> = Vec::new();
    match circumcircle(&p, sup) {
        Some((cx, cy, r2)) => cells.push(Cell { v: sup, cx, cy, r2 }),
        None => {
            return Err(EtchError::InterpolationFailed(
                "degenerate super-triangle".to_string(),
            ))
        }
    }

    for idx in 0..n {
        let [px, py] = p[idx];
        let mut edges: HashMap<(usize, usize), usize> = HashMap::new();
        let mut kept: Vec<Cell> = Vec::with_capacity(cells.len() + 2);
        for cell in cells.drain(..) {
            let d2 = (px - cell.cx) * (px - cell.cx) + (py - cell.cy) * (py - cell.cy);
            if d2 < cell.r2 * (1.0 - 1e-12) {
                for k in 0..3 {
                    let a = cell.v[k];
                    let b = cell.v[(k + 1) % 3];
                    *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
                }
            } else {
                kept.push(cell);
            }
        }
        cells = kept;
        for (&(a, b), &count) in &edges {
            if count != 1 {
                continue;
            }
            let mut v = [a, b, idx];
            if orient(&p, v) < 0.0 {
                v.swap(0, 1);
            }
            if let Some((cx, cy, r2)) = circumcircle(&p, v) {
                cells.push(Cell { v, cx, cy, r2 });
            }
        }
    }

    let triangles: Vec<[usize; 3]> = cells
        .into_iter()
        .filter(|c| c.v.iter().all(|&v| v < n))
        .filter(|c| orient(&p, c.v).abs() > DEGENERATE_AREA)
        .map(|c| c.v)
        .collect();

    if triangles.is_empty() {
        return Err(EtchError::InterpolationFailed(
            "samples are collinear; no triangles formed".to_string(),
        ));
    }

    Ok(Triangulation {
        points: points.to_vec(),
        triangles,
    })
}
