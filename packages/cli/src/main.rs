#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the crime atlas.
//!
//! `run` executes the whole pipeline from a TOML config. `interactive`
//! rebuilds the Leaflet page from a previously exported
//! `joined.geojson` without touching the raw inputs.
//!
//! Uses `indicatif-log-bridge` (via
//! [`crime_atlas_cli_utils::init_logger`]) so log lines and progress bars
//! never fight for the terminal.

mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crime_atlas_render::InteractiveOptions;
use crime_atlas_render::color::hex_to_rgba;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "crime_atlas", about = "Join crime counts onto borough maps")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every stage and write the maps and `GeoJSON` outputs
    Run {
        /// Path to the TOML run configuration
        #[arg(long, default_value = "atlas.toml")]
        config: PathBuf,
    },
    /// Build the interactive map from a saved `joined.geojson`
    Interactive {
        /// Pre-built polygon dataset
        #[arg(long)]
        input: PathBuf,

        /// Destination HTML file
        #[arg(long, default_value = "interactive.html")]
        output: PathBuf,

        /// Numeric field driving polygon fill
        #[arg(long, default_value = "CrimeCount")]
        color_field: String,

        #[arg(long, default_value = "Crime atlas")]
        title: String,

        #[arg(long, default_value = "#ffffb2")]
        low_color: String,

        #[arg(long, default_value = "#bd0026")]
        high_color: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crime_atlas_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => {
            let config = AppConfig::load_from_file(&config)?;
            log::info!("Writing outputs to {}", config.output.dir.display());
            let summary = pipeline::run(&config, &multi).await?;
            log::info!(
                "Mapped {} regions with {} points inside them:",
                summary.polygons.len(),
                summary.points_within.len()
            );
            for path in &summary.outputs {
                log::info!("  {}", path.display());
            }
        }
        Command::Interactive {
            input,
            output,
            color_field,
            title,
            low_color,
            high_color,
        } => {
            let options = InteractiveOptions {
                title,
                color_field: Some(color_field),
                low_color: hex_to_rgba(&low_color)?,
                high_color: hex_to_rgba(&high_color)?,
            };
            pipeline::interactive(input, &output, options).await?;
        }
    }

    Ok(())
}
