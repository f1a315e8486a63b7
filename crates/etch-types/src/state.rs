// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use ndarray::{Array1, Array2, Zip};

use crate::error::{EtchError, EtchResult};

/// Square simulation lattice centred on the wafer.
///
/// Rows follow Y, columns follow X (meshgrid convention): `xx[[i, j]] = axis[j]`,
/// `yy[[i, j]] = axis[i]`.
#[derive(Debug, Clone)]
pub struct WaferGrid {
    pub n: usize,
    pub grid_size: f64,
    pub resolution: f64,
    pub wafer_radius: f64,
    pub axis: Array1<f64>,    // [-grid_size/2, ...] step = resolution
    pub xx: Array2<f64>,      // [n, n]
    pub yy: Array2<f64>,      // [n, n]
    pub radial: Array2<f64>,  // sqrt(xx² + yy²)
    pub mask: Array2<bool>,   // radial <= wafer_radius
}

impl WaferGrid {
    /// Node count is `floor(grid_size / resolution) + 1`; nodes sit at
    /// `-grid_size/2 + i * resolution` so the step is exactly `resolution`.
    pub fn new(grid_size: f64, resolution: f64, wafer_diameter: f64) -> EtchResult<Self> {
        if !grid_size.is_finite() || grid_size <= 0.0 {
            return Err(EtchError::ConfigError(
                "grid_size must be finite and > 0".to_string(),
            ));
        }
        if !resolution.is_finite() || resolution <= 0.0 || resolution > grid_size {
            return Err(EtchError::ConfigError(
                "resolution must be finite, > 0 and <= grid_size".to_string(),
            ));
        }
        if !wafer_diameter.is_finite() || wafer_diameter <= 0.0 {
            return Err(EtchError::ConfigError(
                "wafer_diameter must be finite and > 0".to_string(),
            ));
        }

        // Absorb representation error in ratios like 0.3 / 0.1.
        let n = ((grid_size / resolution) + 1e-9).floor() as usize + 1;
        let half = grid_size / 2.0;
        let axis = Array1::from_shape_fn(n, |i| -half + i as f64 * resolution);

        let mut xx = Array2::zeros((n, n));
        let mut yy = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                xx[[i, j]] = axis[j];
                yy[[i, j]] = axis[i];
            }
        }
        let radial = Zip::from(&xx)
            .and(&yy)
            .map_collect(|&x, &y| (x * x + y * y).sqrt());
        let wafer_radius = wafer_diameter / 2.0;
        let mask = radial.mapv(|r| r <= wafer_radius);

        Ok(WaferGrid {
            n,
            grid_size,
            resolution,
            wafer_radius,
            axis,
            xx,
            yy,
            radial,
            mask,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    pub fn wafer_diameter(&self) -> f64 {
        self.wafer_radius * 2.0
    }

    /// Whether this grid was built from the given dimensions.
    pub fn matches(&self, grid_size: f64, resolution: f64, wafer_diameter: f64) -> bool {
        (self.grid_size - grid_size).abs() < 1e-12
            && (self.resolution - resolution).abs() < 1e-12
            && (self.wafer_diameter() - wafer_diameter).abs() < 1e-12
    }

    pub fn mask_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Field values restricted to the wafer mask, in row-major order.
    pub fn masked_values(&self, field: &Array2<f64>) -> Vec<f64> {
        Zip::from(field)
            .and(&self.mask)
            .fold(Vec::with_capacity(self.mask_count()), |mut acc, &v, &m| {
                if m {
                    acc.push(v);
                }
                acc
            })
    }

    pub fn check_shape(&self, field: &Array2<f64>) -> EtchResult<()> {
        if field.dim() != self.shape() {
            return Err(EtchError::GridMismatch {
                expected: self.shape(),
                found: field.dim(),
            });
        }
        Ok(())
    }
}

/// One thickness measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteredSample {
    pub x: f64,         // mm
    pub y: f64,         // mm
    pub thickness: f64, // nm
}

impl ScatteredSample {
    pub fn new(x: f64, y: f64, thickness: f64) -> Self {
        ScatteredSample { x, y, thickness }
    }
}

/// Collapse duplicate (x, y) positions keeping the last reading, preserving
/// first-occurrence order.
pub fn dedup_samples(samples: &[ScatteredSample]) -> Vec<ScatteredSample> {
    let mut out: Vec<ScatteredSample> = Vec::with_capacity(samples.len());
    for s in samples {
        match out
            .iter_mut()
            .find(|o| o.x == s.x && o.y == s.y)
        {
            Some(existing) => existing.thickness = s.thickness,
            None => out.push(*s),
        }
    }
    out
}

/// Summary statistics of a field over the wafer mask.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub range: f64,
    /// 100 × range / (2 × mean), in percent.
    pub uniformity: f64,
}

impl FieldStats {
    /// Statistics of finite values. All zeros when nothing is finite.
    pub fn from_values(values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return FieldStats::default();
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        let range = max - min;
        let uniformity = if mean != 0.0 {
            100.0 * range / (2.0 * mean)
        } else {
            0.0
        };
        FieldStats {
            min,
            max,
            mean,
            range,
            uniformity,
        }
    }

    pub fn over_mask(field: &Array2<f64>, grid: &WaferGrid) -> Self {
        FieldStats::from_values(&grid.masked_values(field))
    }
}
