use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::Value;
use wearcast::{parse_features, ForestConfig, Pipeline, PipelineError, StorageConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Storage root holding training_data.json and models/ (defaults to $WEARCAST_HOME
    /// or the platform data directory)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one observation: a JSON payload with a `training_data` object
    Record {
        /// Inline JSON payload
        #[arg(conflicts_with = "file")]
        payload: Option<String>,
        /// Read the payload from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Train one classifier per label key on every stored observation
    Train {
        /// Number of trees per forest
        #[arg(long, default_value_t = 100)]
        trees: usize,
        /// Random seed for reproducible training
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Maximum tree depth (unbounded if omitted)
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Predict labels for a JSON object of feature values
    Infer {
        /// Feature values, e.g. '{"temp": 40, "sky": "cloudy"}'
        #[arg(long)]
        features: String,
        /// Comma-separated label keys; every trained label if omitted
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },
    /// Show stored record count, feature schema and trained labels
    Info,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            // 2 for client errors, 1 for everything else
            match e.downcast_ref::<PipelineError>() {
                Some(pipeline_error) if pipeline_error.is_client_error() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let storage = args
        .home
        .map(StorageConfig::from_root)
        .unwrap_or_else(StorageConfig::from_env);

    match args.command {
        Command::Record { payload, file } => {
            let raw = match (payload, file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read payload from {:?}", path))?,
                (None, None) => anyhow::bail!("provide a JSON payload or --file"),
            };
            let payload: Value = serde_json::from_str(&raw).context("payload is not valid JSON")?;

            let pipeline = Pipeline::builder().with_storage(storage).build()?;
            let (message, data) = pipeline.record_observation(&payload)?;
            print_json(&serde_json::json!({
                "message": "Training data received",
                "status": message.trim_end(),
                "data": data,
            }))
        }
        Command::Train {
            trees,
            seed,
            max_depth,
        } => {
            let config = ForestConfig {
                n_trees: trees,
                seed,
                max_depth,
                ..ForestConfig::default()
            };
            let pipeline = Pipeline::builder()
                .with_storage(storage)
                .with_forest_config(config)?
                .build()?;

            let start = std::time::Instant::now();
            let report = pipeline.train()?;
            info!(
                "Trained {} labels on {} records in {:.2?}",
                report.labels.len(),
                report.records,
                start.elapsed()
            );
            print_json(&report)
        }
        Command::Infer { features, labels } => {
            let value: Value = serde_json::from_str(&features).context("features are not valid JSON")?;
            let features = parse_features(&value)?;

            let pipeline = Pipeline::builder().with_storage(storage).build()?;
            let predictions = pipeline.infer(Some(&features), labels.as_slice())?;
            print_json(&predictions)
        }
        Command::Info => {
            let pipeline = Pipeline::builder().with_storage(storage).build()?;
            print_json(&pipeline.info()?)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
