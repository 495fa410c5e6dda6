//! Smoke-test the inference pipeline from the command line.
//!
//! Loads the model artifacts, reads one request body from a file or stdin
//! and prints the response envelope.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trip_duration::server::adapter::JSON_CONTENT_TYPE;
use trip_duration::{PredictionService, ServiceConfig};

#[derive(Parser)]
#[command(name = "trip-predict")]
#[command(about = "Predict trip durations from a JSON request body")]
#[command(version)]
struct Cli {
    /// Directory holding the model artifacts
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Request body file, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Content type of the request body
    #[arg(short, long, default_value = JSON_CONTENT_TYPE)]
    content_type: String,

    /// TOML service configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    }
    .with_env_overrides();
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let body = read_body(&cli.input)?;

    let service = PredictionService::new(config);
    service
        .load()
        .await
        .with_context(|| format!("failed to load model from {}", service.config().model_dir.display()))?;

    let (response, content_type) = service
        .invoke(&body, &cli.content_type)
        .await
        .context("prediction failed")?;

    info!(content_type, "{}", service.stats().format_stats());
    println!("{}", response);
    Ok(())
}

fn read_body(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut body = Vec::new();
        std::io::stdin()
            .read_to_end(&mut body)
            .context("failed to read request from stdin")?;
        Ok(body)
    } else {
        std::fs::read(input).with_context(|| format!("failed to read request from {}", input))
    }
}
