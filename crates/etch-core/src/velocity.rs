// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Velocity Mapping
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Dwell time → stage velocity, with a linear ramp to full speed across the
//! transition annulus outside the wafer edge.

use etch_types::constants::DWELL_EPSILON;
use etch_types::error::{EtchError, EtchResult};
use etch_types::state::WaferGrid;
use ndarray::{Array2, Zip};

/// Stage speed limits (mm/s) and the ramp width beyond the wafer (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimits {
    pub min_speed: f64,
    pub max_speed: f64,
    pub transition_width: f64,
}

impl SpeedLimits {
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min_speed, self.max_speed)
    }

    fn check(&self) -> EtchResult<()> {
        let ok = self.min_speed.is_finite()
            && self.max_speed.is_finite()
            && self.min_speed > 0.0
            && self.min_speed <= self.max_speed;
        if !ok {
            return Err(EtchError::ConfigError(
                "speed limits must satisfy 0 < min_speed <= max_speed".to_string(),
            ));
        }
        if !self.transition_width.is_finite() || self.transition_width < 0.0 {
            return Err(EtchError::ConfigError(
                "transition_width must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Velocity for one cell at radius `r` from its dwell time.
fn cell_velocity(dwell: f64, r: f64, radius: f64, limits: &SpeedLimits) -> f64 {
    let raw = if dwell > DWELL_EPSILON {
        1.0 / dwell
    } else {
        limits.max_speed
    };
    let v = limits.clamp(raw);

    let outer = radius + limits.transition_width;
    if r > outer {
        limits.max_speed
    } else if r > radius && limits.transition_width > 0.0 {
        let w = (r - radius) / limits.transition_width;
        limits.clamp((1.0 - w) * v + w * limits.max_speed)
    } else {
        v
    }
}

/// Velocity field (mm/s) on `grid` from a dwell-time field.
///
/// Inside the wafer `v = clamp(1/dwell)`; beyond `R + transition_width` the
/// stage runs at `max_speed`; in between the two blend linearly in radius.
pub fn dwell_to_velocity(
    dwell: &Array2<f64>,
    grid: &WaferGrid,
    limits: &SpeedLimits,
) -> EtchResult<Array2<f64>> {
    limits.check()?;
    grid.check_shape(dwell)?;
    let radius = grid.wafer_radius;
    Ok(Zip::from(dwell)
        .and(&grid.radial)
        .map_collect(|&d, &r| cell_velocity(d, r, radius, limits)))
}
