// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Target Etch Depth
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Required removal depth from a thickness field and a target thickness.

use etch_types::error::{EtchError, EtchResult};
use etch_types::state::{FieldStats, WaferGrid};
use ndarray::Array2;

/// Etch depth (nm) needed to bring `thickness` to `target`.
///
/// With `m` the minimum thickness inside the wafer: a target below `m` shifts
/// the whole field (`thickness − target`); otherwise only cells thicker than
/// the target are etched and the rest get zero. No cell is ever negative.
pub fn target_etch_depth(
    thickness: &Array2<f64>,
    grid: &WaferGrid,
    target: f64,
) -> EtchResult<Array2<f64>> {
    grid.check_shape(thickness)?;
    if !target.is_finite() {
        return Err(EtchError::ConfigError(
            "target_thickness must be finite".to_string(),
        ));
    }

    let inside = grid.masked_values(thickness);
    let m = if inside.is_empty() {
        FieldStats::from_values(thickness.as_slice().unwrap_or(&[])).min
    } else {
        FieldStats::from_values(&inside).min
    };

    let depth = if target < m {
        thickness.mapv(|t| (t - target).max(0.0))
    } else {
        thickness.mapv(|t| if t > target { t - target } else { 0.0 })
    };
    Ok(depth)
}
