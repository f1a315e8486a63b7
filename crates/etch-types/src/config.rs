// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_REGULARIZATION, MAX_SPEED, MIN_SPEED, RETAIN_FRACTION};
use crate::error::{EtchError, EtchResult};
use crate::state::WaferGrid;

/// Simulation parameters. Maps 1:1 to `app_config.json`.
/// Every field has a default so partial files deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Full edge length of the square simulation domain (mm).
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    /// Node spacing (mm/pixel).
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_wafer_diameter")]
    pub wafer_diameter: f64,
    /// Post-etch target thickness (nm).
    #[serde(default = "default_target_thickness")]
    pub target_thickness: f64,
    /// Width of the speed ramp outside the wafer edge (mm).
    #[serde(default = "default_transition_width")]
    pub transition_width: f64,
    /// Edge length of the stage recipe crop (mm).
    #[serde(default = "default_recipe_range")]
    pub recipe_range: f64,
    /// Post-etch uniformity that ends refinement (%).
    #[serde(default = "default_uniformity_threshold")]
    pub uniformity_threshold: f64,
    /// Average etch amount that triggers plural scanning (nm).
    #[serde(default = "default_speed_threshold")]
    pub speed_threshold: f64,
    #[serde(default)]
    pub stage_center_x: f64,
    #[serde(default)]
    pub stage_center_y: f64,
    /// Keep every `y_step`-th row of the stage map.
    #[serde(default = "default_y_step")]
    pub y_step: usize,
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    #[serde(default = "default_regularization")]
    pub regularization: f64,
    /// Thin-plate-spline extrapolation to the full wafer.
    #[serde(default = "default_true")]
    pub extend_interpolation: bool,
    #[serde(default = "default_beam_sigma")]
    pub beam_sigma: f64,
    #[serde(default)]
    pub refinement: RefinementConfig,
}

/// Budget of the outlier refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_iqr_rounds")]
    pub max_iqr_rounds: usize,
    #[serde(default = "default_max_min_removals")]
    pub max_min_removals: usize,
    #[serde(default = "default_retain_fraction")]
    pub retain_fraction: f64,
}

fn default_grid_size() -> f64 {
    170.0
}
fn default_resolution() -> f64 {
    1.0
}
fn default_wafer_diameter() -> f64 {
    150.0
}
fn default_target_thickness() -> f64 {
    1800.0
}
fn default_transition_width() -> f64 {
    50.0
}
fn default_recipe_range() -> f64 {
    160.0
}
fn default_uniformity_threshold() -> f64 {
    0.5
}
fn default_speed_threshold() -> f64 {
    140.0
}
fn default_y_step() -> usize {
    2
}
fn default_min_speed() -> f64 {
    MIN_SPEED
}
fn default_max_speed() -> f64 {
    MAX_SPEED
}
fn default_regularization() -> f64 {
    DEFAULT_REGULARIZATION
}
fn default_beam_sigma() -> f64 {
    crate::constants::BEAM_SIGMA
}
fn default_true() -> bool {
    true
}
fn default_max_iqr_rounds() -> usize {
    20
}
fn default_max_min_removals() -> usize {
    50
}
fn default_retain_fraction() -> f64 {
    RETAIN_FRACTION
}

impl Default for RefinementConfig {
    fn default() -> Self {
        RefinementConfig {
            enabled: true,
            max_iqr_rounds: default_max_iqr_rounds(),
            max_min_removals: default_max_min_removals(),
            retain_fraction: default_retain_fraction(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            grid_size: default_grid_size(),
            resolution: default_resolution(),
            wafer_diameter: default_wafer_diameter(),
            target_thickness: default_target_thickness(),
            transition_width: default_transition_width(),
            recipe_range: default_recipe_range(),
            uniformity_threshold: default_uniformity_threshold(),
            speed_threshold: default_speed_threshold(),
            stage_center_x: 0.0,
            stage_center_y: 0.0,
            y_step: default_y_step(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            regularization: default_regularization(),
            extend_interpolation: true,
            beam_sigma: default_beam_sigma(),
            refinement: RefinementConfig::default(),
        }
    }
}

fn positive_finite(name: &str, value: f64) -> EtchResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EtchError::ConfigError(format!(
            "{name} must be finite and > 0"
        )));
    }
    Ok(())
}

fn non_negative_finite(name: &str, value: f64) -> EtchResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EtchError::ConfigError(format!(
            "{name} must be finite and >= 0"
        )));
    }
    Ok(())
}

impl SimulationConfig {
    /// Load from JSON file.
    pub fn from_file(path: &str) -> EtchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EtchResult<()> {
        positive_finite("grid_size", self.grid_size)?;
        positive_finite("resolution", self.resolution)?;
        positive_finite("wafer_diameter", self.wafer_diameter)?;
        positive_finite("recipe_range", self.recipe_range)?;
        positive_finite("min_speed", self.min_speed)?;
        positive_finite("max_speed", self.max_speed)?;
        positive_finite("regularization", self.regularization)?;
        non_negative_finite("target_thickness", self.target_thickness)?;
        non_negative_finite("transition_width", self.transition_width)?;
        non_negative_finite("uniformity_threshold", self.uniformity_threshold)?;
        non_negative_finite("speed_threshold", self.speed_threshold)?;
        non_negative_finite("beam_sigma", self.beam_sigma)?;
        if !self.stage_center_x.is_finite() || !self.stage_center_y.is_finite() {
            return Err(EtchError::ConfigError(
                "stage center must be finite".to_string(),
            ));
        }
        if self.resolution > self.grid_size {
            return Err(EtchError::ConfigError(
                "resolution must not exceed grid_size".to_string(),
            ));
        }
        if self.min_speed > self.max_speed {
            return Err(EtchError::ConfigError(
                "min_speed must not exceed max_speed".to_string(),
            ));
        }
        if self.y_step == 0 {
            return Err(EtchError::ConfigError("y_step must be >= 1".to_string()));
        }
        let keep = self.refinement.retain_fraction;
        if !keep.is_finite() || !(0.0..=1.0).contains(&keep) {
            return Err(EtchError::ConfigError(
                "refinement.retain_fraction must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wafer_radius(&self) -> f64 {
        self.wafer_diameter / 2.0
    }

    /// Floor applied to every dwell-time cell.
    pub fn min_dwell(&self) -> f64 {
        crate::constants::MIN_DWELL_FACTOR / self.max_speed
    }

    /// Build the simulation grid from config dimensions.
    pub fn create_grid(&self) -> EtchResult<WaferGrid> {
        WaferGrid::new(self.grid_size, self.resolution, self.wafer_diameter)
    }
}
