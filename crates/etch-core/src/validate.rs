// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Convolution Validation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward re-simulation of the etch from a dwell map.
//!
//! The simulated depth is a direct same-size convolution of the dwell map
//! with the flipped raw beam, i.e. a correlation with the raw beam. The
//! comparison against the requested depth runs in memory.

use etch_math::filter::{convolve_same, flip_both};
use etch_types::error::{EtchError, EtchResult};
use etch_types::state::{FieldStats, WaferGrid};
use log::debug;
use ndarray::{Array2, Zip};

/// Outcome of one validation pass.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Depth the dwell map actually removes (nm).
    pub simulated_depth: Array2<f64>,
    /// Predicted post-etch thickness; initial thickness outside the wafer.
    pub validated_thickness: Array2<f64>,
    /// Mean squared depth error over wafer cells.
    pub mse: f64,
    pub validated_stats: FieldStats,
    /// `initial − validated`, zero outside the wafer.
    pub etch_amount: Array2<f64>,
    pub etch_stats: FieldStats,
}

/// Depth removed by `dwell` under the unblurred `raw_beam`.
pub fn forward_simulate(dwell: &Array2<f64>, raw_beam: &Array2<f64>) -> EtchResult<Array2<f64>> {
    if raw_beam.is_empty() {
        return Err(EtchError::EmptyBeam);
    }
    Ok(convolve_same(dwell, &flip_both(raw_beam)))
}

/// Re-simulate the etch and compare it with the requested depth.
pub fn validate(
    dwell: &Array2<f64>,
    raw_beam: &Array2<f64>,
    target_depth: &Array2<f64>,
    initial_thickness: &Array2<f64>,
    grid: &WaferGrid,
) -> EtchResult<ValidationReport> {
    grid.check_shape(dwell)?;
    grid.check_shape(target_depth)?;
    grid.check_shape(initial_thickness)?;

    let simulated_depth = forward_simulate(dwell, raw_beam)?;

    let mut sq_sum = 0.0;
    let mut count = 0usize;
    Zip::from(&simulated_depth)
        .and(target_depth)
        .and(&grid.mask)
        .for_each(|&sim, &want, &inside| {
            if inside {
                sq_sum += (sim - want).powi(2);
                count += 1;
            }
        });
    let mse = if count > 0 {
        sq_sum / count as f64
    } else {
        0.0
    };

    let validated_thickness = Zip::from(initial_thickness)
        .and(&simulated_depth)
        .and(&grid.mask)
        .map_collect(|&t, &sim, &inside| if inside { t - sim } else { t });
    let etch_amount = initial_thickness - &validated_thickness;

    let validated_stats = FieldStats::over_mask(&validated_thickness, grid);
    let etch_stats = FieldStats::over_mask(&etch_amount, grid);
    debug!(
        "validation: mse={mse:.4}, uniformity={:.3}%",
        validated_stats.uniformity
    );

    Ok(ValidationReport {
        simulated_depth,
        validated_thickness,
        mse,
        validated_stats,
        etch_amount,
        etch_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_is_correlation() {
        let mut dwell = Array2::zeros((7, 7));
        dwell[[3, 3]] = 2.0;
        let beam = ndarray::array![[0.0, 1.0, 0.0], [0.0, 5.0, 3.0], [0.0, 0.0, 0.0]];
        let sim = forward_simulate(&dwell, &beam).unwrap();
        // A delta correlated with the beam yields the point-reflected beam
        assert_eq!(sim[[3, 3]], 10.0);
        assert_eq!(sim[[3, 2]], 6.0);
        assert_eq!(sim[[4, 3]], 2.0);
        let total: f64 = sim.iter().sum();
        assert_eq!(total, 18.0);
    }

    #[test]
    fn test_perfect_dwell_zero_mse() {
        let grid = WaferGrid::new(10.0, 1.0, 6.0).unwrap();
        let dwell = Array2::from_elem(grid.shape(), 0.0);
        let beam = Array2::from_elem((3, 3), 1.0);
        let depth = Array2::zeros(grid.shape());
        let initial = Array2::from_elem(grid.shape(), 1000.0);
        let r = validate(&dwell, &beam, &depth, &initial, &grid).unwrap();
        assert_eq!(r.mse, 0.0);
        assert_eq!(r.validated_stats.uniformity, 0.0);
        assert!(r.etch_amount.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_outside_mask_keeps_initial() {
        let grid = WaferGrid::new(10.0, 1.0, 4.0).unwrap();
        let dwell = Array2::from_elem(grid.shape(), 1.0);
        let beam = ndarray::array![[2.0]];
        let depth = Array2::from_elem(grid.shape(), 2.0);
        let initial = Array2::from_elem(grid.shape(), 100.0);
        let r = validate(&dwell, &beam, &depth, &initial, &grid).unwrap();
        assert_eq!(r.validated_thickness[[0, 0]], 100.0);
        assert_eq!(r.validated_thickness[[5, 5]], 98.0);
        assert_eq!(r.etch_amount[[5, 5]], 2.0);
        assert_eq!(r.etch_amount[[0, 0]], 0.0);
        assert_eq!(r.mse, 0.0);
        assert!((r.etch_stats.mean - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_mse_counts_mask_only() {
        let grid = WaferGrid::new(10.0, 1.0, 4.0).unwrap();
        let dwell = Array2::from_elem(grid.shape(), 1.0);
        let beam = ndarray::array![[1.0]];
        // Error of 3 everywhere; mask cells see 3² = 9
        let depth = Array2::from_elem(grid.shape(), 4.0);
        let initial = Array2::from_elem(grid.shape(), 10.0);
        let r = validate(&dwell, &beam, &depth, &initial, &grid).unwrap();
        assert!((r.mse - 9.0).abs() < 1e-12, "mse {}", r.mse);
    }

    #[test]
    fn test_empty_beam() {
        let dwell = Array2::zeros((3, 3));
        assert!(matches!(
            forward_simulate(&dwell, &Array2::zeros((0, 0))),
            Err(EtchError::EmptyBeam)
        ));
    }
}
