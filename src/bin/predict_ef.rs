use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use echo_ef::config::PipelineConfig;
use echo_ef::models::{DemographicRecord, EfPredictionRequest, ViewType, VolumeTracings};
use echo_ef::services::{interpret, EfPredictor};

/// Predict the ejection fraction of a single echocardiogram
///
/// Model locations and the predictor variant come from the same environment
/// variables as the server.
#[derive(Parser)]
#[command(name = "predict-ef")]
#[command(version)]
struct Cli {
    /// Echocardiogram video, absolute or relative to MEDIA_ROOT
    video: PathBuf,

    /// Acquisition view (a4c or psax)
    #[arg(long, default_value = "a4c")]
    view: ViewType,

    /// Patient age in years
    #[arg(long)]
    age: u32,

    /// Patient weight in kg
    #[arg(long)]
    weight: f64,

    /// Patient height in cm
    #[arg(long)]
    height: f64,

    /// JSON file with the volume tracing coordinates: {"X": [...], "Y": [...]}
    #[arg(long)]
    tracings: PathBuf,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let tracings = std::fs::read_to_string(&cli.tracings)
        .with_context(|| format!("Failed to read {}", cli.tracings.display()))?;
    let tracings: VolumeTracings = serde_json::from_str(&tracings)
        .with_context(|| format!("Invalid tracings in {}", cli.tracings.display()))?;

    let request = EfPredictionRequest {
        video: cli.video,
        view: cli.view,
        demographics: DemographicRecord::new(cli.age, cli.weight, cli.height),
        tracings,
    };

    let config = PipelineConfig::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let predictor = EfPredictor::from_config(&config)?;
            let ejection_fraction = predictor
                .predict(&request)
                .await
                .context("EF prediction failed")?;
            let interpretation = interpret(ejection_fraction);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&interpretation)?);
            } else {
                println!("EF: {}% ({})", ejection_fraction, interpretation.category);
            }
            Ok(())
        })
}
