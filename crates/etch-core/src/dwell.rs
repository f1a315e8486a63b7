// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Dwell-Time Deconvolution
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Wiener deconvolution of the etch-depth field by the beam kernel.
//!
//! Solves `depth ≈ dwell ⊛ beam` for `dwell` in the frequency domain:
//!
//! 1. zero-pad both fields by n/2 per side,
//! 2. ifftshift (centre → index 0), forward FFT,
//! 3. `W = conj(F_I) / (|F_I|² + 1/ε_reg)`, `F_D = F_E · W`,
//! 4. inverse FFT, real part, fftshift, crop,
//! 5. floor at `0.1 / max_speed`.
//!
//! The shift order is load-bearing: swapping it mirrors the result.

use etch_math::fft::{fft2, fftshift, ifft2_complex, ifftshift};
use etch_types::constants::{DEFAULT_REGULARIZATION, MAX_SPEED, MIN_DWELL_FACTOR};
use etch_types::error::{EtchError, EtchResult};
use ndarray::{s, Array2, Zip};
use num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WienerConfig {
    /// ε_reg; the filter denominator gains 1/ε_reg.
    pub regularization: f64,
    /// Dwell floor is `MIN_DWELL_FACTOR / max_speed`.
    pub max_speed: f64,
}

impl Default for WienerConfig {
    fn default() -> Self {
        Self {
            regularization: DEFAULT_REGULARIZATION,
            max_speed: MAX_SPEED,
        }
    }
}

impl WienerConfig {
    pub fn min_dwell(&self) -> f64 {
        MIN_DWELL_FACTOR / self.max_speed
    }

    pub fn validate(&self) -> EtchResult<()> {
        if !self.regularization.is_finite() || self.regularization <= 0.0 {
            return Err(EtchError::ConfigError(
                "regularization must be finite and > 0".to_string(),
            ));
        }
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return Err(EtchError::ConfigError(
                "max_speed must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn zero_pad(field: &Array2<f64>, pad_r: usize, pad_c: usize) -> Array2<f64> {
    let (nr, nc) = field.dim();
    let mut out = Array2::zeros((nr + 2 * pad_r, nc + 2 * pad_c));
    out.slice_mut(s![pad_r..pad_r + nr, pad_c..pad_c + nc])
        .assign(field);
    out
}

/// Dwell-time field (s per cell) from etch depth `depth` and beam kernel
/// `beam`, both on the simulation grid.
///
/// An all-zero beam is not an error: the filter vanishes and every cell
/// takes the floor value.
pub fn solve_dwell_time(
    depth: &Array2<f64>,
    beam: &Array2<f64>,
    config: &WienerConfig,
) -> EtchResult<Array2<f64>> {
    config.validate()?;
    if depth.dim() != beam.dim() {
        return Err(EtchError::GridMismatch {
            expected: depth.dim(),
            found: beam.dim(),
        });
    }
    if depth.iter().chain(beam.iter()).any(|v| !v.is_finite()) {
        return Err(EtchError::Numerical(
            "deconvolution input contains non-finite values".to_string(),
        ));
    }

    let (nr, nc) = depth.dim();
    let (pad_r, pad_c) = (nr / 2, nc / 2);

    let e = ifftshift(&zero_pad(depth, pad_r, pad_c));
    let i = ifftshift(&zero_pad(beam, pad_r, pad_c));
    let f_e = fft2(&e);
    let f_i = fft2(&i);

    let inv_reg = 1.0 / config.regularization;
    let f_d = Zip::from(&f_e)
        .and(&f_i)
        .map_collect(|&fe, &fi| fe * (fi.conj() / Complex64::new(fi.norm_sqr() + inv_reg, 0.0)));

    let d_shifted = ifft2_complex(&f_d).mapv(|c| c.re);
    let d = fftshift(&d_shifted);

    let floor = config.min_dwell();
    let dwell = d
        .slice(s![pad_r..pad_r + nr, pad_c..pad_c + nc])
        .mapv(|v| v.max(floor));
    Ok(dwell)
}
