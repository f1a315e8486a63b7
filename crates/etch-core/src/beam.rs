// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Beam Projection
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Raw beam profile and its projection onto the simulation grid.
//!
//! Beam samples carry etch-rate units (nm/s) and are never normalized:
//! dwell × rate = depth depends on the absolute scale.

use etch_math::filter::gaussian_filter;
use etch_types::error::{EtchError, EtchResult};
use etch_types::state::WaferGrid;
use ndarray::{s, Array2};

/// Sampled beam-intensity kernel, one sample per grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamProfile {
    samples: Array2<f64>,
}

impl BeamProfile {
    pub fn new(samples: Array2<f64>) -> EtchResult<Self> {
        if samples.is_empty() {
            return Err(EtchError::EmptyBeam);
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(EtchError::Numerical(
                "beam profile contains non-finite samples".to_string(),
            ));
        }
        Ok(BeamProfile { samples })
    }

    /// Build from ragged rows; short rows are padded with zeros.
    pub fn from_rows(rows: &[Vec<f64>]) -> EtchResult<Self> {
        let nrows = rows.len();
        let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if nrows == 0 || ncols == 0 {
            return Err(EtchError::EmptyBeam);
        }
        let samples = Array2::from_shape_fn((nrows, ncols), |(i, j)| {
            rows[i].get(j).copied().unwrap_or(0.0)
        });
        BeamProfile::new(samples)
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn dim(&self) -> (usize, usize) {
        self.samples.dim()
    }

    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    pub fn is_all_zero(&self) -> bool {
        self.samples.iter().all(|&v| v == 0.0)
    }
}

/// Source and destination ranges along one axis when centring `len` samples
/// on `n` cells. A beam wider than the grid is centre-cropped.
fn centred_span(len: usize, n: usize) -> (usize, usize, usize) {
    if len <= n {
        // (src_start, dst_start, count)
        (0, (n - len) / 2, len)
    } else {
        ((len - n) / 2, 0, n)
    }
}

/// Place the beam centred on the grid (offset `(n − w) / 2`) and blur with
/// a Gaussian of `sigma` cells.
pub fn project_beam(beam: &BeamProfile, grid: &WaferGrid, sigma: f64) -> Array2<f64> {
    let (n_rows, n_cols) = grid.shape();
    let (b_rows, b_cols) = beam.dim();
    let (sr, dr, cr) = centred_span(b_rows, n_rows);
    let (sc, dc, cc) = centred_span(b_cols, n_cols);

    let mut kernel = Array2::zeros((n_rows, n_cols));
    kernel
        .slice_mut(s![dr..dr + cr, dc..dc + cc])
        .assign(&beam.samples.slice(s![sr..sr + cr, sc..sc + cc]));
    gaussian_filter(&kernel, sigma)
}
