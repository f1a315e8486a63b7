// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Trajectory Recipe
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Flatten a velocity field into an ordered list of stage waypoints.

use etch_types::error::EtchResult;
use etch_types::state::WaferGrid;
use ndarray::Array2;

use crate::velocity::SpeedLimits;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub x: f64,
    pub y: f64,
    /// Stage speed (mm/s).
    pub velocity: f64,
}

/// One waypoint per grid node, clamped to the speed limits and ordered by
/// descending `y`, then ascending `x`. Rows are not reversed alternately.
pub fn build_trajectory(
    velocity: &Array2<f64>,
    grid: &WaferGrid,
    limits: &SpeedLimits,
) -> EtchResult<Vec<TrajectoryPoint>> {
    grid.check_shape(velocity)?;
    let mut points: Vec<TrajectoryPoint> = velocity
        .indexed_iter()
        .map(|((i, j), &v)| TrajectoryPoint {
            x: grid.axis[j],
            y: grid.axis[i],
            velocity: limits.clamp(v),
        })
        .collect();
    points.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
    Ok(points)
}
