use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::loader::{partition_paths, TARGET_COLUMN};

/// Feature columns written by the generator, in file order.
pub const FEATURE_COLUMNS: [&str; 23] = [
    "duration",
    "src_bytes",
    "dst_bytes",
    "land",
    "wrong_fragment",
    "urgent",
    "hot",
    "num_failed_logins",
    "logged_in",
    "num_compromised",
    "count",
    "srv_count",
    "serror_rate",
    "rerror_rate",
    "same_srv_rate",
    "diff_srv_rate",
    "dst_host_count",
    "dst_host_srv_count",
    "dst_host_same_srv_rate",
    "dst_host_serror_rate",
    "protocol_tcp",
    "protocol_udp",
    "protocol_icmp",
];

/// What to generate and where.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub partitions: Vec<String>,
    pub dataset_type: String,
    pub inliers_per_partition: usize,
    pub outliers_per_partition: usize,
    pub seed: u64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            partitions: vec!["train".to_string(), "test".to_string()],
            dataset_type: "all".to_string(),
            inliers_per_partition: 2000,
            outliers_per_partition: 200,
            seed: 2018,
        }
    }
}

/// Attack families used for outlier rows.
#[derive(Debug, Clone, Copy)]
enum Attack {
    Smurf,
    Neptune,
    Portsweep,
    GuessPasswd,
}

impl Attack {
    const ALL: [Attack; 4] = [
        Attack::Smurf,
        Attack::Neptune,
        Attack::Portsweep,
        Attack::GuessPasswd,
    ];

    fn label(self) -> &'static str {
        match self {
            Attack::Smurf => "smurf",
            Attack::Neptune => "neptune",
            Attack::Portsweep => "portsweep",
            Attack::GuessPasswd => "guess_passwd",
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling helpers
// ---------------------------------------------------------------------------

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn non_neg(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    gauss(rng, mean, std_dev).max(0.0).round()
}

fn rate(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let r = gauss(rng, mean, std_dev).clamp(0.0, 1.0);
    (r * 100.0).round() / 100.0
}

fn one_hot(index: usize, n: usize) -> impl Iterator<Item = f64> {
    (0..n).map(move |i| if i == index { 1.0 } else { 0.0 })
}

/// FNV-1a, so each partition gets its own stream regardless of which
/// partitions are generated together.
fn partition_seed(seed: u64, partition: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in partition.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    seed ^ hash
}

// ---------------------------------------------------------------------------
// Row generators
// ---------------------------------------------------------------------------

fn normal_row(rng: &mut StdRng) -> Vec<f64> {
    // mostly tcp sessions with some udp (dns) and rare icmp (ping)
    let proto = match rng.gen_range(0..100) {
        0..=79 => 0,
        80..=96 => 1,
        _ => 2,
    };
    let logged_in = if proto == 0 && rng.gen_bool(0.85) { 1.0 } else { 0.0 };
    let count = non_neg(rng, 8.0, 6.0).max(1.0);

    let mut row = vec![
        non_neg(rng, 2.0, 10.0),
        gauss(rng, 5.5, 1.0).exp().round(),
        gauss(rng, 7.5, 1.2).exp().round(),
        0.0,
        0.0,
        0.0,
        non_neg(rng, 0.1, 0.4),
        0.0,
        logged_in,
        0.0,
        count,
        (count + non_neg(rng, 2.0, 3.0)).round(),
        rate(rng, 0.0, 0.02),
        rate(rng, 0.02, 0.05),
        rate(rng, 0.97, 0.05),
        rate(rng, 0.03, 0.05),
        non_neg(rng, 150.0, 80.0).min(255.0),
        non_neg(rng, 200.0, 60.0).min(255.0),
        rate(rng, 0.85, 0.15),
        rate(rng, 0.01, 0.02),
    ];
    row.extend(one_hot(proto, 3));
    row
}

fn attack_row(rng: &mut StdRng, attack: Attack) -> Vec<f64> {
    let (proto, mut row) = match attack {
        Attack::Smurf => {
            let count = non_neg(rng, 500.0, 20.0).min(511.0);
            (
                2,
                vec![
                    0.0,
                    non_neg(rng, 1032.0, 5.0),
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    count,
                    count,
                    0.0,
                    0.0,
                    1.0,
                    0.0,
                    255.0,
                    255.0,
                    1.0,
                    0.0,
                ],
            )
        }
        Attack::Neptune => (
            0,
            vec![
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                non_neg(rng, 200.0, 60.0),
                non_neg(rng, 12.0, 6.0),
                rate(rng, 0.99, 0.02),
                rate(rng, 0.0, 0.02),
                rate(rng, 0.06, 0.04),
                rate(rng, 0.07, 0.03),
                255.0,
                non_neg(rng, 15.0, 8.0),
                rate(rng, 0.06, 0.04),
                rate(rng, 0.99, 0.02),
            ],
        ),
        Attack::Portsweep => (
            0,
            vec![
                non_neg(rng, 500.0, 1500.0),
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                non_neg(rng, 2.0, 2.0).max(1.0),
                non_neg(rng, 2.0, 2.0).max(1.0),
                rate(rng, 0.1, 0.2),
                rate(rng, 0.9, 0.15),
                rate(rng, 0.5, 0.3),
                rate(rng, 0.6, 0.3),
                non_neg(rng, 40.0, 30.0).min(255.0),
                non_neg(rng, 2.0, 2.0),
                rate(rng, 0.05, 0.05),
                rate(rng, 0.1, 0.1),
            ],
        ),
        Attack::GuessPasswd => (
            0,
            vec![
                non_neg(rng, 3.0, 2.0),
                non_neg(rng, 125.0, 10.0),
                non_neg(rng, 180.0, 20.0),
                0.0,
                0.0,
                0.0,
                non_neg(rng, 1.0, 0.5),
                1.0,
                0.0,
                0.0,
                1.0,
                1.0,
                0.0,
                0.0,
                1.0,
                0.0,
                non_neg(rng, 80.0, 30.0).min(255.0),
                non_neg(rng, 5.0, 3.0),
                rate(rng, 0.1, 0.1),
                0.0,
            ],
        ),
    };
    row.extend(one_hot(proto, 3));
    row
}

fn write_rows(path: &Path, rows: &[(Vec<f64>, &str)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(FEATURE_COLUMNS.iter().copied().chain([TARGET_COLUMN]))?;
    for (values, label) in rows {
        let record = values
            .iter()
            .map(|v| v.to_string())
            .chain(std::iter::once(label.to_string()));
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a synthetic KDD-shaped dataset under `data_path`.
///
/// For each partition this produces `<type>_inliers.csv` (normal traffic)
/// and `<type>_outliers.csv` (a mix of flood, sweep and brute-force rows),
/// both with a trailing `target` label column. Existing files are
/// overwritten. Returns the written paths.
pub fn generate_dataset(data_path: &Path, opts: &GenerateOptions) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for partition in &opts.partitions {
        let mut rng = StdRng::seed_from_u64(partition_seed(opts.seed, partition));
        let (inlier_path, outlier_path) =
            partition_paths(data_path, partition, &opts.dataset_type);
        if let Some(dir) = inlier_path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        let inliers: Vec<(Vec<f64>, &str)> = (0..opts.inliers_per_partition)
            .map(|_| (normal_row(&mut rng), "normal"))
            .collect();
        let outliers: Vec<(Vec<f64>, &str)> = (0..opts.outliers_per_partition)
            .map(|i| {
                let attack = Attack::ALL[i % Attack::ALL.len()];
                (attack_row(&mut rng, attack), attack.label())
            })
            .collect();

        write_rows(&inlier_path, &inliers)?;
        write_rows(&outlier_path, &outliers)?;
        log::info!(
            "Wrote {} inliers and {} outliers to {}",
            inliers.len(),
            outliers.len(),
            inlier_path.parent().unwrap_or(data_path).display()
        );

        written.push(inlier_path);
        written.push(outlier_path);
    }

    Ok(written)
}
