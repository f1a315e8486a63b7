// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — CLI Runner
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Job runner: reads inputs, drives the pipeline, writes every artifact.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use etch_core::io::{
    read_beam_csv, read_thickness_csv, write_grid_csv, write_log_csv, write_samples_csv,
    write_stage_map_csv, write_trajectory_csv, MapKind, OrderedRules,
};
use etch_core::pipeline::{Pipeline, RecipeSummary, SimulationContext};
use etch_core::refine::{AlwaysContinue, OutlierRefinementLoop, RefinementOutcome};
use etch_core::report::{wafer_number, SimulationLog};
use etch_types::config::SimulationConfig;
use etch_types::error::EtchResult;

pub const STAGE_MAP_FILE: &str = "stage_Y-motor_speed_map.csv";

/// One simulation request.
pub struct Job {
    pub thickness: PathBuf,
    pub beam: PathBuf,
    pub output: PathBuf,
    pub config: SimulationConfig,
}

/// What the run produced, for the console summary.
#[derive(Debug)]
pub struct RunSummary {
    pub output: PathBuf,
    pub sample_count: usize,
    pub outcome: Option<RefinementOutcome>,
    pub initial_uniformity: f64,
    pub final_uniformity: f64,
    pub mse: f64,
    pub scan_count: usize,
    pub process_time_s: f64,
    pub files: Vec<PathBuf>,
}

impl RunSummary {
    pub fn print(&self) {
        println!();
        println!("Samples used:       {}", self.sample_count);
        if let Some(outcome) = self.outcome {
            println!("Refinement:         {outcome:?}");
        }
        println!(
            "Uniformity:         {:.3}% -> {:.3}%",
            self.initial_uniformity, self.final_uniformity
        );
        println!("Validation MSE:     {:.5}", self.mse);
        println!("Scans:              {}", self.scan_count);
        println!("Etching time:       {:.2} s", self.process_time_s);
        println!();
        println!("Wrote {} files to {}", self.files.len(), self.output.display());
    }
}

/// Create `dir/name` and hand a buffered writer to `write`.
fn save<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> EtchResult<()>,
{
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write(&mut out).with_context(|| format!("writing {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(path)
}

fn file_label(path: &Path, stem: bool) -> String {
    let part = if stem {
        path.file_stem()
    } else {
        path.file_name()
    };
    part.map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "thickness".to_string())
}

/// Run one job end to end.
pub fn run_job(job: &Job) -> Result<RunSummary> {
    std::fs::create_dir_all(&job.output)
        .with_context(|| format!("creating output directory {}", job.output.display()))?;

    let original = read_thickness_csv(&job.thickness, &OrderedRules)
        .with_context(|| format!("reading thickness data {}", job.thickness.display()))?;
    let beam = read_beam_csv(&job.beam)
        .with_context(|| format!("reading beam profile {}", job.beam.display()))?;
    info!(
        "loaded {} thickness samples and a {:?} beam",
        original.len(),
        beam.dim()
    );

    let pipeline = Pipeline::new(job.config.clone()).context("building simulation grid")?;
    let base_name = file_label(&job.thickness, true);
    let source_name = file_label(&job.thickness, false);
    let dir = job.output.as_path();
    let mut files = Vec::new();

    let (ctx, state, outcome) = if pipeline.config().refinement.enabled {
        let refiner = OutlierRefinementLoop::new(&pipeline, &beam, &base_name);
        let report = refiner
            .run(&original, &mut AlwaysContinue)
            .context("outlier refinement")?;
        for record in &report.history {
            files.push(save(dir, &format!("{}.csv", record.dataset_name), |w| {
                write_samples_csv(w, &record.remaining)
            })?);
        }
        if report.outcome != RefinementOutcome::MetTarget {
            warn!(
                "uniformity {:.3}% above target {:.3}% ({:?})",
                report.context.uniformity(),
                pipeline.config().uniformity_threshold,
                report.outcome
            );
        }
        (report.context, Some(report.state), Some(report.outcome))
    } else {
        let ctx = pipeline.run(&original, &beam).context("simulation")?;
        (ctx, None, None)
    };

    let recipe = pipeline.recipe(&ctx).context("building stage recipe")?;
    files.extend(write_maps(dir, &ctx, &recipe)?);

    let log = SimulationLog::from_run(
        pipeline.config(),
        &source_name,
        &original,
        &ctx,
        &recipe,
        state.as_ref(),
    );
    let log_name = format!("{}_simulation_log.csv", wafer_number(&source_name));
    files.push(save(dir, &log_name, |w| write_log_csv(w, &log.record()))?);

    Ok(RunSummary {
        output: job.output.clone(),
        sample_count: ctx.samples.len(),
        outcome,
        initial_uniformity: ctx.initial_stats.uniformity,
        final_uniformity: ctx.uniformity(),
        mse: ctx.validation.mse,
        scan_count: recipe.plan.count(),
        process_time_s: recipe.process_time_s,
        files,
    })
}

/// Grid maps, trajectory and stage speed tables of the accepted run.
fn write_maps(dir: &Path, ctx: &SimulationContext, recipe: &RecipeSummary) -> Result<Vec<PathBuf>> {
    let grid = &ctx.grid;
    let maps = [
        ("thickness_map.csv", &ctx.thickness.field, MapKind::Thickness),
        ("etching_depth_map.csv", &ctx.depth, MapKind::Depth),
        ("dwell_time_map.csv", &ctx.dwell, MapKind::Dwell),
        ("velocity_map.csv", &ctx.velocity, MapKind::Velocity),
        (
            "validated_thickness_map.csv",
            &ctx.validation.validated_thickness,
            MapKind::Thickness,
        ),
        (
            "etching_amount_map.csv",
            &ctx.validation.etch_amount,
            MapKind::Depth,
        ),
    ];
    let mut files = Vec::with_capacity(maps.len() + 3);
    for (name, field, kind) in maps {
        files.push(save(dir, name, |w| write_grid_csv(w, grid, field, kind))?);
    }

    let trajectory = ctx.trajectory().context("building trajectory")?;
    files.push(save(dir, "stage_recipe.csv", |w| {
        write_trajectory_csv(w, &trajectory)
    })?);
    files.push(save(dir, STAGE_MAP_FILE, |w| {
        write_stage_map_csv(w, &recipe.stage_map)
    })?);
    if let (Some(prefix), Some(plural)) = (recipe.plan.file_prefix(), &recipe.plural_map) {
        let name = format!("{prefix}{STAGE_MAP_FILE}");
        files.push(save(dir, &name, |w| write_stage_map_csv(w, plural))?);
    }
    Ok(files)
}

/// Best-effort `error.txt` next to the artifacts.
pub fn write_error_report(dir: &Path, err: &anyhow::Error) {
    let path = dir.join("error.txt");
    let written = std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&path, format!("{err:?}\n")));
    if let Err(e) = written {
        warn!("could not write {}: {e}", path.display());
    }
}
