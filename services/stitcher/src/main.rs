//! Drift driver stitcher.
//!
//! Harmonizes currents, Stokes drift and winds into one composite store and
//! optionally drifts particles through it.

mod config;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use grid_harmonizer::{CompositeReader, CompositeWriter, TracingSink};
use ingestion::{StitchReport, Stitcher};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use trajectory::{export_geojson, export_summary, DriftRunner, TrackSet};

use config::{load_run_config, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "stitcher")]
#[command(about = "Harmonize ocean and atmosphere drivers for particle drift")]
struct Args {
    /// Run configuration file path
    #[arg(short, long, env = "STITCHER_CONFIG", default_value = "config/run.yaml")]
    config: PathBuf,

    /// Log level (overrides the config; RUST_LOG overrides both)
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: json or pretty
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the driver composite
    Stitch {
        /// Output store (defaults to paths.drivers)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Drift particles through an existing composite
    Drift {
        /// Composite store (defaults to paths.drivers)
        #[arg(short, long)]
        drivers: Option<PathBuf>,

        #[arg(long)]
        horizon_hours: Option<u32>,
    },
    /// Stitch, then drift
    Run,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = load_run_config(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    init_tracing(&config)?;

    info!(config = %args.config.display(), "Starting drift driver stitcher");

    match args.command {
        Command::Stitch { output } => {
            if let Some(output) = output {
                config.paths.drivers = output;
            }
            let report = stitch(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Drift {
            drivers,
            horizon_hours,
        } => {
            if let Some(drivers) = drivers {
                config.paths.drivers = drivers;
            }
            if let Some(hours) = horizon_hours {
                config.horizon_hours = hours;
            }
            drift(&config)?;
        }
        Command::Run => {
            stitch(&config)?;
            drift(&config)?;
        }
    }

    Ok(())
}

fn init_tracing(config: &RunConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // stdout carries command output.
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);
    let installed = match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    Ok(())
}

fn stitch(config: &RunConfig) -> Result<StitchReport> {
    let request = config.stitch_request();
    ensure_parent(&request.output)?;

    let writer = CompositeWriter::new(config.composite.storage.clone())
        .context("Invalid composite settings")?;
    let sink = TracingSink::default();

    let report = Stitcher::new(writer, &sink)
        .run(&request)
        .with_context(|| format!("Failed to stitch drivers into {:?}", request.output))?;

    info!(
        output = %report.output.display(),
        time_steps = report.time_steps,
        lat = report.grid_shape.0,
        lon = report.grid_shape.1,
        bytes = report.bytes_written,
        "Stitching complete"
    );
    Ok(report)
}

fn drift(config: &RunConfig) -> Result<TrackSet> {
    let composite = CompositeReader::open(&config.paths.drivers)
        .with_context(|| format!("Failed to open composite {:?}", config.paths.drivers))?;

    let runner = DriftRunner::new(config.drift.step_secs)?;
    let tracks = runner
        .run(
            &composite,
            &config.particles,
            &config.release,
            config.horizon_hours,
        )
        .context("Drift run failed")?;

    ensure_parent(&config.paths.tracks)?;
    ensure_parent(&config.paths.summary)?;
    export_geojson(&tracks, &config.paths.tracks)?;
    export_summary(
        &tracks,
        &config.particles,
        config.horizon_hours,
        &config.paths.summary,
    )?;

    info!(
        tracks = %config.paths.tracks.display(),
        summary = %config.paths.summary.display(),
        particles = tracks.n_particles(),
        deactivated = tracks.n_deactivated(),
        "Drift complete"
    );
    Ok(tracks)
}
