//! deepad: train, evaluate and apply reconstruction-error anomaly models.
//!
//! Usage:
//!   deepad train    [--model ae|pca] [--data-path DIR] [--model-dir DIR]
//!   deepad evaluate [--report FILE]
//!   deepad score    <INPUT> --output <FILE>
//!
//! Examples:
//!   # Train the autoencoder on data/kdd/train, generating data if missing
//!   deepad train --model ae --epochs 20
//!
//!   # AUC / F1 on data/kdd/test, threshold at the 99th inlier percentile
//!   deepad evaluate --percentile 99 --report report.json

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use deepad::config::ExperimentConfig;
use deepad::experiment;
use deepad::models::ModelKind;

#[derive(Parser)]
#[command(name = "deepad")]
#[command(author, version, about = "Autoencoder and PCA anomaly detection for intrusion data")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON experiment config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Model to use (ae or pca)
    #[arg(short, long, global = true)]
    model: Option<ModelKind>,

    /// Root of the partitioned dataset
    #[arg(long, global = true)]
    data_path: Option<PathBuf>,

    /// File-name prefix inside each partition
    #[arg(long, global = true)]
    dataset_type: Option<String>,

    /// Directory for weights, scaler and reports
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit scaler and model on the training partition
    Train {
        /// Training epochs (autoencoder)
        #[arg(long)]
        epochs: Option<usize>,

        /// Number of principal components (pca)
        #[arg(long)]
        components: Option<usize>,

        /// Share of inliers held out for validation
        #[arg(long)]
        validation_fraction: Option<f64>,
    },

    /// Score the test partition and report AUC / threshold metrics
    Evaluate {
        /// Inlier-score percentile used as the anomaly threshold
        #[arg(short, long)]
        percentile: Option<f64>,

        /// Write the report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Score an arbitrary CSV or Parquet table
    Score {
        /// Table to score
        input: PathBuf,

        /// Output CSV (row, score[, target])
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn resolve_config(cli: &Cli) -> Result<ExperimentConfig> {
    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(path) = &cli.data_path {
        config.data_path = path.clone();
    }
    if let Some(dataset_type) = &cli.dataset_type {
        config.dataset_type = dataset_type.clone();
    }
    if let Some(dir) = &cli.model_dir {
        config.model_dir = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = resolve_config(&cli)?;

    match cli.command {
        Commands::Train {
            epochs,
            components,
            validation_fraction,
        } => {
            if let Some(epochs) = epochs {
                config.autoencoder.epochs = epochs;
            }
            if let Some(components) = components {
                config.pca_components = components;
            }
            if let Some(fraction) = validation_fraction {
                config.validation_fraction = fraction;
            }

            let summary = experiment::train(&config)?;
            println!(
                "Trained {} on {} rows x {} features ({} validation rows)",
                summary.model, summary.train_rows, summary.n_features, summary.validation_rows
            );
            if let Some(score) = summary.mean_validation_score {
                println!("Mean validation score: {score:.6}");
            }
            println!("Saved to {}", summary.model_dir.display());
        }

        Commands::Evaluate { percentile, report } => {
            if let Some(pct) = percentile {
                config.threshold_percentile = pct;
            }

            let result = experiment::evaluate(&config)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(path) = report {
                let text = serde_json::to_string_pretty(&result)?;
                std::fs::write(&path, text)
                    .with_context(|| format!("writing report {}", path.display()))?;
            }
        }

        Commands::Score { input, output } => {
            let n = experiment::score_file(&config, &input, &output)?;
            println!("Scored {n} rows -> {}", output.display());
        }
    }

    Ok(())
}
