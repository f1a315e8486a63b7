// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — CLI
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Beam etch command-line interface.
//!
//! ```sh
//! beam-etch run --thickness wafer_2711.csv --beam beam.csv --output out/
//! beam-etch validate --config configs/app_config.json
//! ```

mod runner;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use etch_types::config::SimulationConfig;

#[derive(Parser)]
#[command(name = "beam-etch")]
#[command(about = "Ion-beam etch dwell-time simulator")]
#[command(version)]
struct Cli {
    /// Raise the default log level to debug.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one wafer and write all recipe artifacts.
    Run {
        /// Measured thickness table (x, y, thickness).
        #[arg(long)]
        thickness: PathBuf,
        /// Headerless beam-intensity matrix.
        #[arg(long)]
        beam: PathBuf,
        /// JSON configuration; defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        /// Skip the outlier refinement loop.
        #[arg(long)]
        no_refine: bool,
    },
    /// Check a configuration file without running anything.
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SimulationConfig> {
    match path {
        Some(p) => SimulationConfig::from_file(&p.to_string_lossy())
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(SimulationConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Run {
            thickness,
            beam,
            config,
            output,
            no_refine,
        } => {
            let mut cfg = load_config(config.as_ref())?;
            if no_refine {
                cfg.refinement.enabled = false;
            }
            let job = runner::Job {
                thickness,
                beam,
                output,
                config: cfg,
            };

            println!("Beam Etch Simulator");
            println!("===================");
            println!("Thickness: {}", job.thickness.display());
            println!("Beam:      {}", job.beam.display());

            let out_dir = job.output.clone();
            let handle = std::thread::Builder::new()
                .name("beam-etch-run".to_string())
                .spawn(move || runner::run_job(&job))
                .context("spawning simulation thread")?;
            let result = handle
                .join()
                .map_err(|_| anyhow::anyhow!("simulation thread panicked"))
                .and_then(|r| r);

            match result {
                Ok(summary) => {
                    summary.print();
                    Ok(())
                }
                Err(e) => {
                    runner::write_error_report(&out_dir, &e);
                    Err(e)
                }
            }
        }
        Commands::Validate { config } => {
            let cfg = load_config(Some(&config))?;
            let grid = cfg.create_grid()?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "Grid: {}x{} nodes, {} mm @ {} mm/px, wafer {} mm ({} cells inside)",
                grid.n,
                grid.n,
                cfg.grid_size,
                cfg.resolution,
                cfg.wafer_diameter,
                grid.mask_count()
            );
            Ok(())
        }
    }
}
