//! `gridsense` – command line front end for the grid perception sensor.
//!
//! Subcommands:
//!
//! - `init`     – write a default `~/.gridsense/config.toml`.
//! - `schema`   – print the JSON schema of the `[sensor]` table.
//! - `perceive` – run one perception cycle over a TOML scene, print an
//!   occupancy map and optionally write the tensor and PNG blocks to disk.

mod config;
mod map;
mod output;
mod scene;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};

use gridsense_perception::GridSensor;
use gridsense_perception::encoding::AttributeExtractor;
use gridsense_types::GridConfiguration;

#[derive(Parser)]
#[command(name = "gridsense", about = "Grid-based spatial perception encoder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration to ~/.gridsense/config.toml
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the JSON schema of the sensor configuration
    Schema,
    /// Perceive a scene and print the occupancy map
    Perceive {
        /// Scene file (TOML)
        #[arg(short, long)]
        scene: PathBuf,
        /// Config file to use instead of ~/.gridsense/config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory for manifest.json, tensor.json and the PNG blocks
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level (default "info"); GRIDSENSE_LOG_FORMAT=json
    // switches to newline-delimited JSON.  Logs go to stderr; stdout carries
    // command output.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("GRIDSENSE_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Init { force } => run_init(force),
        Command::Schema => run_schema(),
        Command::Perceive { scene, config, out } => run_perceive(&scene, config.as_deref(), out),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ── init ────────────────────────────────────────────────────────────────────

fn run_init(force: bool) -> Result<(), String> {
    let path = config::config_path();
    if path.exists() && !force {
        println!(
            "  Config already exists at {} (use {} to overwrite).",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return Ok(());
    }
    config::save(&config::Config::default())?;
    println!(
        "{} Config written to {}",
        "✓".green(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ── schema ──────────────────────────────────────────────────────────────────

fn run_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(GridConfiguration);
    let raw = serde_json::to_string_pretty(&schema)
        .map_err(|e| format!("Failed to serialize schema: {}", e))?;
    println!("{raw}");
    Ok(())
}

// ── perceive ────────────────────────────────────────────────────────────────

fn load_config(path: Option<&std::path::Path>) -> Result<config::Config, String> {
    match path {
        Some(p) => config::load_from(p)?
            .ok_or_else(|| format!("No config file at {}", p.display())),
        None => match config::load()? {
            Some(cfg) => Ok(cfg),
            None => {
                warn!(
                    path = %config::config_path().display(),
                    "no config file found; using defaults (run `gridsense init` to create one)"
                );
                let mut cfg = config::Config::default();
                config::apply_env_overrides(&mut cfg);
                Ok(cfg)
            }
        },
    }
}

fn run_perceive(
    scene_path: &std::path::Path,
    config_path: Option<&std::path::Path>,
    out: Option<PathBuf>,
) -> Result<(), String> {
    let cfg = load_config(config_path)?;
    let scene = scene::Scene::load(scene_path)?;
    let (world, observer) = scene.build()?;
    info!(objects = world.len(), scene = %scene_path.display(), "scene loaded");

    let mut sensor = GridSensor::new(cfg.sensor.clone())
        .map_err(|e| e.to_string())?
        .with_extractor(AttributeExtractor);

    let mut recorder = map::MapRecorder::new(&cfg.sensor);
    sensor
        .perceive_with(&world, &observer, &mut recorder)
        .map_err(|e| e.to_string())?;

    let observer_cell = sensor.point_to_cell(observer.pose.position, &observer);

    println!();
    println!(
        "  {} {}×{} cells, {} value(s) per cell",
        sensor.name().bold(),
        cfg.sensor.grid_num_side_x,
        cfg.sensor.grid_num_side_z,
        sensor.layout().observation_per_cell()
    );
    print!("{}", map::render(&recorder, &cfg.sensor, observer_cell));
    println!(
        "  {} of {} cells occupied",
        recorder.occupied().to_string().bold(),
        cfg.sensor.num_cells()
    );

    let out = out.or_else(|| cfg.output_dir.as_ref().map(PathBuf::from));
    if let Some(dir) = out {
        let manifest = output::write_observation(&dir, &sensor, recorder.occupied())?;
        println!(
            "{} Observation {} written to {} ({} block(s))",
            "✓".green(),
            manifest.id.to_string().dimmed(),
            dir.display().to_string().bold(),
            manifest.blocks.len()
        );
    }
    Ok(())
}
