// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Thickness Interpolation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Scattered thickness measurements → dense thickness field.
//!
//! Extend mode fits a local thin-plate spline that extrapolates to the whole
//! lattice. Standard mode tries cubic, linear and nearest in that order.
//! Either way, nodes without data support take the smallest measured
//! thickness, and the field is floored at `MIN_THICKNESS`.

use etch_math::scatter::{
    cubic_scatter, linear_scatter, nearest_grid, thin_plate_grid, ScatterMethod,
};
use etch_types::constants::{MIN_SAMPLES, MIN_THICKNESS, RBF_NEIGHBORS};
use etch_types::error::{EtchError, EtchResult};
use etch_types::state::{dedup_samples, ScatteredSample, WaferGrid};
use log::{debug, warn};
use ndarray::Array2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Thin-plate spline with extrapolation, standard chain on failure.
    #[default]
    Extend,
    /// Cubic → linear → nearest, hull-limited.
    Standard,
}

impl InterpolationMode {
    pub fn from_extend_flag(extend: bool) -> Self {
        if extend {
            InterpolationMode::Extend
        } else {
            InterpolationMode::Standard
        }
    }
}

/// Result of interpolating one sample set onto the grid.
#[derive(Debug, Clone)]
pub struct ThicknessField {
    /// Interpolant output; NaN where the method had no data support.
    pub raw: Array2<f64>,
    /// Gaps filled with the minimum sample and floored; used downstream.
    pub field: Array2<f64>,
    pub method: ScatterMethod,
    /// True when extend mode failed and the standard chain produced `field`.
    pub fell_back: bool,
    /// Samples actually used after duplicate positions were collapsed.
    pub sample_count: usize,
}

type ScatterFn = fn(&[[f64; 2]], &[f64], &[f64], &[f64]) -> EtchResult<Array2<f64>>;

fn standard_chain(
    points: &[[f64; 2]],
    values: &[f64],
    axis: &[f64],
) -> EtchResult<(ScatterMethod, Array2<f64>)> {
    let attempts: [(ScatterMethod, ScatterFn); 3] = [
        (ScatterMethod::Cubic, cubic_scatter),
        (ScatterMethod::Linear, linear_scatter),
        (ScatterMethod::Nearest, nearest_grid),
    ];
    let mut last_err = None;
    for (method, interpolate) in attempts {
        match interpolate(points, values, axis, axis) {
            Ok(field) => {
                debug!("{method} interpolation succeeded");
                return Ok((method, field));
            }
            Err(e) => {
                warn!("{method} interpolation failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(EtchError::InterpolationFailed(format!(
        "all interpolation methods failed; last error: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Interpolate samples onto `grid`.
///
/// Fails with `InsufficientSamples` before any grid work when fewer than
/// three distinct positions remain.
pub fn interpolate_thickness(
    samples: &[ScatteredSample],
    grid: &WaferGrid,
    mode: InterpolationMode,
) -> EtchResult<ThicknessField> {
    let samples = dedup_samples(samples);
    if samples.len() < MIN_SAMPLES {
        return Err(EtchError::InsufficientSamples {
            found: samples.len(),
            required: MIN_SAMPLES,
        });
    }
    if samples
        .iter()
        .any(|s| !s.x.is_finite() || !s.y.is_finite() || !s.thickness.is_finite())
    {
        return Err(EtchError::Numerical(
            "thickness samples contain non-finite values".to_string(),
        ));
    }

    let points: Vec<[f64; 2]> = samples.iter().map(|s| [s.x, s.y]).collect();
    let values: Vec<f64> = samples.iter().map(|s| s.thickness).collect();
    let axis = grid.axis.to_vec();
    let fill = values.iter().copied().fold(f64::INFINITY, f64::min);

    let (method, raw, fell_back) = match mode {
        InterpolationMode::Extend => {
            let neighbors = RBF_NEIGHBORS.min(points.len() - 1);
            match thin_plate_grid(&points, &values, &axis, &axis, neighbors) {
                Ok(field) if field.iter().all(|v| v.is_finite()) => {
                    (ScatterMethod::ThinPlateSpline, field, false)
                }
                Ok(_) => {
                    warn!("thin-plate spline produced non-finite values, using standard chain");
                    let (m, f) = standard_chain(&points, &values, &axis)?;
                    (m, f, true)
                }
                Err(e) => {
                    warn!("thin-plate spline failed ({e}), using standard chain");
                    let (m, f) = standard_chain(&points, &values, &axis)?;
                    (m, f, true)
                }
            }
        }
        InterpolationMode::Standard => {
            let (m, f) = standard_chain(&points, &values, &axis)?;
            (m, f, false)
        }
    };

    let filled = raw.mapv(|v| if v.is_finite() { v } else { fill });
    // Floor at max(field minimum, MIN_THICKNESS): only values below the
    // absolute floor can change.
    let field_min = filled.iter().copied().fold(f64::INFINITY, f64::min);
    let floor = field_min.max(MIN_THICKNESS);
    let field = filled.mapv(|v| v.max(floor));

    debug!(
        "interpolated {} samples onto {}x{} grid with {method}",
        samples.len(),
        grid.n,
        grid.n
    );

    Ok(ThicknessField {
        raw,
        field,
        method,
        fell_back,
        sample_count: samples.len(),
    })
}
