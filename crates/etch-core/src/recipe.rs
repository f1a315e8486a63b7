// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Stage Recipe Post-Processing
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Stage Y-motor speed map, plural-scan planning and process-time estimate.
//!
//! The stage map is the velocity field in stage coordinates, cropped to the
//! recipe range and decimated along Y. When the average etch amount is large
//! the recipe is repeated 2 or 3 times at proportionally higher speed.

use etch_types::constants::ZERO_SPEED_STEP_TIME;
use etch_types::error::{EtchError, EtchResult};
use etch_types::state::WaferGrid;
use ndarray::{Array2, Axis};

const LABEL_TOLERANCE: f64 = 1e-9;

/// Placement of the recipe on the stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLayout {
    pub center_x: f64,
    pub center_y: f64,
    /// Edge length of the square crop (mm).
    pub recipe_range: f64,
    /// Keep every `y_step`-th row.
    pub y_step: usize,
}

/// Velocity samples in stage coordinates.
///
/// `speeds[[r, c]]` belongs to `(x[c], y[r])`. Row data keeps the grid's
/// ascending-Y order while the labels run from high to low.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpeedMap {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub speeds: Array2<f64>,
}

impl StageSpeedMap {
    pub fn dim(&self) -> (usize, usize) {
        self.speeds.dim()
    }
}

fn within(label: f64, center: f64, half: f64) -> bool {
    label >= center - half - LABEL_TOLERANCE && label <= center + half + LABEL_TOLERANCE
}

/// Build the stage speed map from a velocity field on `grid`.
pub fn stage_speed_map(
    velocity: &Array2<f64>,
    grid: &WaferGrid,
    layout: &StageLayout,
) -> EtchResult<StageSpeedMap> {
    grid.check_shape(velocity)?;
    if layout.y_step == 0 {
        return Err(EtchError::ConfigError("y_step must be >= 1".to_string()));
    }
    if !layout.recipe_range.is_finite() || layout.recipe_range <= 0.0 {
        return Err(EtchError::ConfigError(
            "recipe_range must be finite and > 0".to_string(),
        ));
    }
    let half = layout.recipe_range / 2.0;

    let cols: Vec<usize> = (0..grid.n)
        .filter(|&j| within(grid.axis[j] + layout.center_x, layout.center_x, half))
        .collect();
    let rows: Vec<usize> = (0..grid.n)
        .filter(|&i| within(grid.axis[i] + layout.center_y, layout.center_y, half))
        .collect();
    if cols.is_empty() || rows.is_empty() {
        return Err(EtchError::ConfigError(
            "recipe_range selects no grid nodes".to_string(),
        ));
    }

    let x: Vec<f64> = cols.iter().map(|&j| grid.axis[j] + layout.center_x).collect();
    // Labels flipped, data rows untouched
    let y_labels: Vec<f64> = rows
        .iter()
        .rev()
        .map(|&i| grid.axis[i] + layout.center_y)
        .collect();

    let kept: Vec<usize> = (0..rows.len()).step_by(layout.y_step).collect();
    let y = kept.iter().map(|&k| y_labels[k]).collect();
    let speeds = velocity
        .select(Axis(0), &kept.iter().map(|&k| rows[k]).collect::<Vec<_>>())
        .select(Axis(1), &cols);

    Ok(StageSpeedMap { x, y, speeds })
}

/// How many times the recipe is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPlan {
    Single,
    Double,
    Triple,
}

impl ScanPlan {
    pub fn count(self) -> usize {
        match self {
            ScanPlan::Single => 1,
            ScanPlan::Double => 2,
            ScanPlan::Triple => 3,
        }
    }

    /// File-name prefix of the multiplied recipe; none for a single scan.
    pub fn file_prefix(self) -> Option<&'static str> {
        match self {
            ScanPlan::Single => None,
            ScanPlan::Double => Some("2_scan_x2_speed_"),
            ScanPlan::Triple => Some("3_scan_x3_speed_"),
        }
    }
}

/// Scan count from the average etch amount (nm) and the plural-scan
/// threshold `t`: below `t` one pass, below `2t` two, otherwise three.
pub fn plan_scans(average_etch: f64, threshold: f64) -> ScanPlan {
    if average_etch < threshold {
        ScanPlan::Single
    } else if average_etch < 2.0 * threshold {
        ScanPlan::Double
    } else {
        ScanPlan::Triple
    }
}

/// Multiply positive speeds by the scan count, capped at `max_speed`.
pub fn multiply_speed(map: &StageSpeedMap, plan: ScanPlan, max_speed: f64) -> StageSpeedMap {
    let factor = plan.count() as f64;
    StageSpeedMap {
        x: map.x.clone(),
        y: map.y.clone(),
        speeds: map
            .speeds
            .mapv(|v| if v > 0.0 { (v * factor).min(max_speed) } else { v }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanStep {
    pub x: f64,
    pub y: f64,
    pub speed: f64,
}

/// Serpentine walk of the stage map: one column at a time, odd columns in
/// reverse row order.
pub fn scan_path(map: &StageSpeedMap) -> Vec<ScanStep> {
    let (n_rows, n_cols) = map.dim();
    let mut path = Vec::with_capacity(n_rows * n_cols);
    for c in 0..n_cols {
        let step = |r: usize| ScanStep {
            x: map.x[c],
            y: map.y[r],
            speed: map.speeds[[r, c]],
        };
        if c % 2 == 0 {
            path.extend((0..n_rows).map(step));
        } else {
            path.extend((0..n_rows).rev().map(step));
        }
    }
    path
}

/// Time (s) for one pass over `path`: each step costs `|Δy| / v` at the
/// departing point's speed, or a fixed 0.1 s when that speed is zero.
pub fn path_time(path: &[ScanStep]) -> f64 {
    path.windows(2)
        .map(|w| {
            if w[0].speed == 0.0 {
                ZERO_SPEED_STEP_TIME
            } else {
                (w[1].y - w[0].y).abs() / w[0].speed
            }
        })
        .sum()
}

/// Total process time (s): the plan's scan count times one pass over the
/// multiplied stage map.
pub fn estimate_process_time(map: &StageSpeedMap, plan: ScanPlan, max_speed: f64) -> f64 {
    let scanned = multiply_speed(map, plan, max_speed);
    plan.count() as f64 * path_time(&scan_path(&scanned))
}
