// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Simulation Pipeline
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! One full simulation pass: samples + beam → dwell, velocity, validation.
//!
//! Stages:
//! 1. Interpolate the thickness samples onto the grid
//! 2. Required etch depth for the target thickness
//! 3. Project the beam onto the grid
//! 4. Wiener deconvolution → dwell time
//! 5. Dwell → stage velocity
//! 6. Forward re-simulation with the raw beam
//!
//! Each pass returns a fresh [`SimulationContext`]; nothing is shared
//! between runs except the grid.

use crate::beam::{project_beam, BeamProfile};
use crate::depth::target_etch_depth;
use crate::dwell::{solve_dwell_time, WienerConfig};
use crate::recipe::{
    estimate_process_time, multiply_speed, plan_scans, stage_speed_map, ScanPlan, StageLayout,
    StageSpeedMap,
};
use crate::thickness::{interpolate_thickness, InterpolationMode, ThicknessField};
use crate::trajectory::{build_trajectory, TrajectoryPoint};
use crate::validate::{validate, ValidationReport};
use crate::velocity::{dwell_to_velocity, SpeedLimits};
use etch_types::config::SimulationConfig;
use etch_types::error::EtchResult;
use etch_types::state::{dedup_samples, FieldStats, ScatteredSample, WaferGrid};
use log::{debug, info, warn};
use ndarray::Array2;

/// Immutable result of one pipeline run.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub grid: WaferGrid,
    /// Samples the run was computed from (duplicates collapsed).
    pub samples: Vec<ScatteredSample>,
    pub thickness: ThicknessField,
    pub depth: Array2<f64>,
    /// Beam projected and blurred on the grid.
    pub beam_kernel: Array2<f64>,
    pub dwell: Array2<f64>,
    pub velocity: Array2<f64>,
    pub validation: ValidationReport,
    /// Thickness statistics before etching, over the wafer.
    pub initial_stats: FieldStats,
    pub limits: SpeedLimits,
    pub elapsed_ms: f64,
}

impl SimulationContext {
    /// Post-etch uniformity (%).
    pub fn uniformity(&self) -> f64 {
        self.validation.validated_stats.uniformity
    }

    pub fn meets_target(&self, threshold: f64) -> bool {
        self.uniformity() <= threshold
    }

    pub fn trajectory(&self) -> EtchResult<Vec<TrajectoryPoint>> {
        build_trajectory(&self.velocity, &self.grid, &self.limits)
    }

    pub fn stage_map(&self, layout: &StageLayout) -> EtchResult<StageSpeedMap> {
        stage_speed_map(&self.velocity, &self.grid, layout)
    }

    /// Scan plan from the mean etch amount over the wafer.
    pub fn scan_plan(&self, threshold: f64) -> ScanPlan {
        plan_scans(self.validation.etch_stats.mean, threshold)
    }
}

/// Recipe artifacts derived from a finished run.
#[derive(Debug, Clone)]
pub struct RecipeSummary {
    pub stage_map: StageSpeedMap,
    pub plan: ScanPlan,
    /// Speed-multiplied stage map for plural scans.
    pub plural_map: Option<StageSpeedMap>,
    pub process_time_s: f64,
}

/// Grid-bound simulation driver.
pub struct Pipeline {
    config: SimulationConfig,
    grid: WaferGrid,
}

impl Pipeline {
    pub fn new(config: SimulationConfig) -> EtchResult<Self> {
        config.validate()?;
        let grid = config.create_grid()?;
        Ok(Pipeline { config, grid })
    }

    pub fn from_file(path: &str) -> EtchResult<Self> {
        Self::new(SimulationConfig::from_file(path)?)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &WaferGrid {
        &self.grid
    }

    /// Swap in a new configuration; the grid is rebuilt only when its
    /// dimensions changed.
    pub fn reconfigure(&mut self, config: SimulationConfig) -> EtchResult<()> {
        config.validate()?;
        if !self
            .grid
            .matches(config.grid_size, config.resolution, config.wafer_diameter)
        {
            debug!(
                "rebuilding grid: {} mm @ {} mm/px, wafer {} mm",
                config.grid_size, config.resolution, config.wafer_diameter
            );
            self.grid = config.create_grid()?;
        }
        self.config = config;
        Ok(())
    }

    pub fn speed_limits(&self) -> SpeedLimits {
        SpeedLimits {
            min_speed: self.config.min_speed,
            max_speed: self.config.max_speed,
            transition_width: self.config.transition_width,
        }
    }

    pub fn stage_layout(&self) -> StageLayout {
        StageLayout {
            center_x: self.config.stage_center_x,
            center_y: self.config.stage_center_y,
            recipe_range: self.config.recipe_range,
            y_step: self.config.y_step,
        }
    }

    fn wiener(&self) -> WienerConfig {
        WienerConfig {
            regularization: self.config.regularization,
            max_speed: self.config.max_speed,
        }
    }

    /// Run every stage on one sample set.
    pub fn run(
        &self,
        samples: &[ScatteredSample],
        beam: &BeamProfile,
    ) -> EtchResult<SimulationContext> {
        let start = std::time::Instant::now();
        let grid = &self.grid;
        let limits = self.speed_limits();

        let mode = InterpolationMode::from_extend_flag(self.config.extend_interpolation);
        let thickness = interpolate_thickness(samples, grid, mode)?;
        debug!(
            "thickness field ready ({}, fell_back={})",
            thickness.method, thickness.fell_back
        );

        let depth = target_etch_depth(&thickness.field, grid, self.config.target_thickness)?;
        let beam_kernel = project_beam(beam, grid, self.config.beam_sigma);
        if beam.is_all_zero() {
            warn!("beam profile is all zero; dwell time will sit at the floor");
        }

        let dwell = solve_dwell_time(&depth, &beam_kernel, &self.wiener())?;
        debug!("dwell time solved");
        let velocity = dwell_to_velocity(&dwell, grid, &limits)?;
        let validation = validate(&dwell, beam.samples(), &depth, &thickness.field, grid)?;
        let initial_stats = FieldStats::over_mask(&thickness.field, grid);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "simulation on {} samples: uniformity {:.3}% -> {:.3}%, mse {:.4} ({elapsed_ms:.1} ms)",
            thickness.sample_count,
            initial_stats.uniformity,
            validation.validated_stats.uniformity,
            validation.mse
        );

        Ok(SimulationContext {
            grid: grid.clone(),
            samples: dedup_samples(samples),
            thickness,
            depth,
            beam_kernel,
            dwell,
            velocity,
            validation,
            initial_stats,
            limits,
            elapsed_ms,
        })
    }

    /// Stage map, scan plan and process-time estimate for a finished run.
    pub fn recipe(&self, ctx: &SimulationContext) -> EtchResult<RecipeSummary> {
        let stage_map = ctx.stage_map(&self.stage_layout())?;
        let plan = ctx.scan_plan(self.config.speed_threshold);
        let plural_map = plan
            .file_prefix()
            .map(|_| multiply_speed(&stage_map, plan, self.config.max_speed));
        let process_time_s = estimate_process_time(&stage_map, plan, self.config.max_speed);
        Ok(RecipeSummary {
            stage_map,
            plan,
            plural_map,
            process_time_s,
        })
    }
}
