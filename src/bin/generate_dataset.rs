//! Write a synthetic KDD-shaped dataset for the `deepad` experiments.
//!
//! ```text
//! generate-dataset --out data/kdd --partitions train,test --parquet
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use deepad::data::generate::{generate_dataset, GenerateOptions};
use deepad::data::loader::TARGET_COLUMN;
use deepad::data::{load_table, write_parquet};

#[derive(Parser)]
#[command(name = "generate-dataset")]
#[command(about = "Generate synthetic inlier/outlier partitions")]
struct Args {
    /// Dataset root; one sub-directory per partition
    #[arg(short, long, default_value = "data/kdd")]
    out: PathBuf,

    /// Partitions to write
    #[arg(short, long, value_delimiter = ',', default_value = "train,test")]
    partitions: Vec<String>,

    /// File-name prefix inside each partition
    #[arg(long, default_value = "all")]
    dataset_type: String,

    /// Normal rows per partition
    #[arg(long, default_value_t = 2000)]
    inliers: usize,

    /// Attack rows per partition
    #[arg(long, default_value_t = 200)]
    outliers: usize,

    #[arg(long, default_value_t = 2018)]
    seed: u64,

    /// Also write a `.parquet` copy next to every CSV
    #[arg(long)]
    parquet: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let opts = GenerateOptions {
        partitions: args.partitions,
        dataset_type: args.dataset_type,
        inliers_per_partition: args.inliers,
        outliers_per_partition: args.outliers,
        seed: args.seed,
    };
    let written = generate_dataset(&args.out, &opts)?;

    for path in &written {
        println!("Written to {}", path.display());
        if args.parquet {
            let table = load_table(path, TARGET_COLUMN)?;
            let pq = path.with_extension("parquet");
            write_parquet(&table, &pq, TARGET_COLUMN)
                .with_context(|| format!("converting {}", path.display()))?;
            println!("Written to {}", pq.display());
        }
    }

    Ok(())
}
