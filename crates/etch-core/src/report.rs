// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Simulation Log
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Flat key/value summary of one finished simulation.

use chrono::{Local, NaiveDateTime};
use etch_types::config::SimulationConfig;
use etch_types::state::{FieldStats, ScatteredSample};

use crate::pipeline::{RecipeSummary, SimulationContext};
use crate::recipe::ScanPlan;
use crate::refine::RefinementState;

/// Wafer number: the first run of ASCII digits in `name`, else `"unknown"`.
pub fn wafer_number(name: &str) -> String {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        "unknown".to_string()
    } else {
        digits
    }
}

fn fmt2(v: f64) -> String {
    format!("{v:.2}")
}

/// Inputs of one log record.
#[derive(Debug, Clone)]
pub struct SimulationLog {
    pub timestamp: NaiveDateTime,
    pub config: SimulationConfig,
    /// File name of the original thickness data.
    pub source_name: String,
    pub simulation_count: usize,
    pub outlier_removal_count: usize,
    pub total_removed_points: usize,
    /// Statistics of the raw original sample thicknesses.
    pub origin: FieldStats,
    /// Post-etch thickness over the wafer.
    pub simulated: FieldStats,
    pub average_etch: f64,
    pub plan: ScanPlan,
    pub etching_time_s: f64,
}

impl SimulationLog {
    /// Collect the log inputs from a finished run.
    ///
    /// `refinement` carries the loop counters; without it the run counts as a
    /// single simulation with nothing removed.
    pub fn from_run(
        config: &SimulationConfig,
        source_name: &str,
        original_samples: &[ScatteredSample],
        ctx: &SimulationContext,
        recipe: &RecipeSummary,
        refinement: Option<&RefinementState>,
    ) -> Self {
        let raw: Vec<f64> = original_samples.iter().map(|s| s.thickness).collect();
        let (simulation_count, outlier_removal_count, total_removed_points) = refinement
            .map(|s| {
                (
                    s.simulation_count,
                    s.outlier_removal_count,
                    s.total_removed_points,
                )
            })
            .unwrap_or((1, 0, 0));
        SimulationLog {
            timestamp: Local::now().naive_local(),
            config: config.clone(),
            source_name: source_name.to_string(),
            simulation_count,
            outlier_removal_count,
            total_removed_points,
            origin: FieldStats::from_values(&raw),
            simulated: ctx.validation.validated_stats,
            average_etch: ctx.validation.etch_stats.mean,
            plan: recipe.plan,
            etching_time_s: recipe.process_time_s,
        }
    }

    /// Ordered `(key, value)` rows.
    pub fn record(&self) -> Vec<(String, String)> {
        let c = &self.config;
        let rows: Vec<(&str, String)> = vec![
            ("Date", self.timestamp.format("%Y%m%d").to_string()),
            ("Time", self.timestamp.format("%H:%M:%S").to_string()),
            ("Grid_size(mm)", fmt2(c.grid_size)),
            ("Resolution(mm/pixel)", fmt2(c.resolution)),
            ("WF_size(mm)", fmt2(c.wafer_diameter)),
            ("Target(nm)", fmt2(c.target_thickness)),
            ("Stage_center_X", fmt2(c.stage_center_x)),
            ("Stage_center_Y", fmt2(c.stage_center_y)),
            ("y-step", c.y_step.to_string()),
            ("Transition_area_Width(mm)", fmt2(c.transition_width)),
            ("Recipe_Length(nm)", fmt2(c.recipe_range)),
            ("Result_Judge_Criteria(%)", fmt2(c.uniformity_threshold)),
            ("Plural_Scan_Judge_Criteria(nm)", fmt2(c.speed_threshold)),
            ("WF_No.", wafer_number(&self.source_name)),
            ("simulation_time", self.simulation_count.to_string()),
            ("error_deleted_time", self.outlier_removal_count.to_string()),
            ("Deleted_points", self.total_removed_points.to_string()),
            ("Origin_Max(nm)", fmt2(self.origin.max)),
            ("Origin_Min(nm)", fmt2(self.origin.min)),
            ("Origin_Average(nm)", fmt2(self.origin.mean)),
            ("Origin_Range(nm)", fmt2(self.origin.range)),
            ("Origin_Uniformity(%)", fmt2(self.origin.uniformity)),
            ("Simulated_Max(nm)", fmt2(self.simulated.max)),
            ("Simulated_Min(nm)", fmt2(self.simulated.min)),
            ("Simulated_Average(nm)", fmt2(self.simulated.mean)),
            ("Simulated_Range(nm)", fmt2(self.simulated.range)),
            ("Simulated_Uniformity(%)", fmt2(self.simulated.uniformity)),
            ("Ave_Etching_amount(nm)", fmt2(self.average_etch)),
            ("Plural_Scan_Time", self.plan.count().to_string()),
            ("Etching_time(s)", fmt2(self.etching_time_s)),
        ];
        rows.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}
