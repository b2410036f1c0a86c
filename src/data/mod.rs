/// Data layer: feature tables, loading, scaling and dataset generation.
///
/// Architecture:
/// ```text
///  <data_path>/<partition>/<type>_{inliers,outliers}.csv
///        │            (missing? → generate)
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → FeatureTable (label column dropped)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ FeatureTable  │  column names, Array2<f64>, labels
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  scaler   │  min-max fit on train inliers → reuse everywhere else
///   └──────────┘
/// ```

pub mod generate;
pub mod loader;
pub mod model;
pub mod scaler;

pub use loader::{load_kdd, load_table, write_parquet, KddOptions, KddPartition};
pub use model::FeatureTable;
pub use scaler::{scale_data, MinMaxScaler};
