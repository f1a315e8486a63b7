// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Slowest stage speed the controller accepts (mm/s).
pub const MIN_SPEED: f64 = 0.01;

/// Fastest stage speed (mm/s). Also the travel speed outside the wafer.
pub const MAX_SPEED: f64 = 500.0;

/// Wiener regularization ε_reg; the filter adds 1/ε_reg to |F_I|².
pub const DEFAULT_REGULARIZATION: f64 = 1e-3;

/// Dwell below this is treated as "no dwell" when converting to speed (s).
pub const DWELL_EPSILON: f64 = 1e-6;

/// Minimum physically meaningful dwell is MIN_DWELL_FACTOR / max_speed.
pub const MIN_DWELL_FACTOR: f64 = 0.1;

/// Gaussian blur applied to the projected beam (grid cells).
pub const BEAM_SIGMA: f64 = 0.5;

/// Floor applied to interpolated thickness (nm).
pub const MIN_THICKNESS: f64 = 0.01;

/// Minimum scattered samples for interpolation.
pub const MIN_SAMPLES: usize = 3;

/// Neighbour count of the local thin-plate-spline fit.
pub const RBF_NEIGHBORS: usize = 200;

/// Tukey fence multiplier for IQR outliers.
pub const IQR_FENCE: f64 = 1.5;

/// Fraction of the original samples that must survive refinement.
pub const RETAIN_FRACTION: f64 = 0.8;

/// Time charged for a recipe step with zero speed (s).
pub const ZERO_SPEED_STEP_TIME: f64 = 0.1;
