use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::Array2;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::generate::{self, GenerateOptions};
use super::model::FeatureTable;
use super::scaler::{scale_data, MinMaxScaler};

/// Name of the label column dropped from every KDD table.
pub const TARGET_COLUMN: &str = "target";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a feature table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one numeric column per feature
/// * `.parquet` – numeric (or boolean) columns, one per feature
///
/// The `drop_col` column, if present, is removed from the features and
/// returned as labels.
pub fn load_table(path: &Path, drop_col: &str) -> Result<FeatureTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path, drop_col),
        "parquet" | "pq" => load_parquet(path, drop_col),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// KDD partition layout
// ---------------------------------------------------------------------------

/// Where a KDD partition lives on disk.
#[derive(Debug, Clone)]
pub struct KddOptions {
    pub data_path: PathBuf,
    /// File-name prefix inside the partition, e.g. `all`.
    pub dataset_type: String,
    /// Sub-directory of `data_path`, e.g. `train` or `test`.
    pub partition: String,
}

impl Default for KddOptions {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/kdd"),
            dataset_type: "all".to_string(),
            partition: "all".to_string(),
        }
    }
}

/// A scaled partition ready for training or scoring.
#[derive(Debug, Clone)]
pub struct KddPartition {
    pub inliers: Array2<f64>,
    pub outliers: Array2<f64>,
    pub scaler: MinMaxScaler,
    pub columns: Vec<String>,
}

/// `<data_path>/<partition>/<type>_inliers.csv` and `..._outliers.csv`.
pub fn partition_paths(data_path: &Path, partition: &str, dataset_type: &str) -> (PathBuf, PathBuf) {
    let dir = data_path.join(partition);
    (
        dir.join(format!("{dataset_type}_inliers.csv")),
        dir.join(format!("{dataset_type}_outliers.csv")),
    )
}

/// Load and scale one partition.
///
/// When the inlier file is missing the dataset generator is run for that
/// partition first. Inliers are scaled with `scaler` if one is given,
/// otherwise a new scaler is fitted on them; outliers always reuse the
/// inlier scaler.
pub fn load_kdd(opts: &KddOptions, scaler: Option<MinMaxScaler>) -> Result<KddPartition> {
    let (inlier_path, outlier_path) =
        partition_paths(&opts.data_path, &opts.partition, &opts.dataset_type);

    if !inlier_path.exists() {
        log::info!(" >> Generating KDD dataset");
        let gen_opts = GenerateOptions {
            partitions: vec![opts.partition.clone()],
            dataset_type: opts.dataset_type.clone(),
            ..GenerateOptions::default()
        };
        generate::generate_dataset(&opts.data_path, &gen_opts)
            .with_context(|| format!("generating dataset under {}", opts.data_path.display()))?;
    }

    let inliers = load_table(&inlier_path, TARGET_COLUMN)
        .with_context(|| format!("loading {}", inlier_path.display()))?;
    let outliers = load_table(&outlier_path, TARGET_COLUMN)
        .with_context(|| format!("loading {}", outlier_path.display()))?;

    if inliers.columns != outliers.columns {
        bail!(
            "{} and {} have different feature columns",
            inlier_path.display(),
            outlier_path.display()
        );
    }

    log::info!(
        " >> KDD dataset loaded ({} inliers, {} outliers, {} features)",
        inliers.len(),
        outliers.len(),
        inliers.n_features()
    );

    let (inlier_matrix, scaler, columns) = scale_data(&inliers, scaler)?;
    let (outlier_matrix, _, _) = scale_data(&outliers, Some(scaler.clone()))?;

    Ok(KddPartition {
        inliers: inlier_matrix,
        outliers: outlier_matrix,
        scaler,
        columns,
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, every non-label cell a number.
fn load_csv(path: &Path, drop_col: &str) -> Result<FeatureTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let drop_idx = headers.iter().position(|h| h == drop_col);
    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != drop_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut rows = Vec::new();
    let mut labels = drop_idx.map(|_| Vec::new());

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let mut row = Vec::with_capacity(columns.len());
        for (col_idx, value) in record.iter().enumerate() {
            if Some(col_idx) == drop_idx {
                if let Some(labels) = labels.as_mut() {
                    labels.push(value.to_string());
                }
                continue;
            }
            row.push(parse_cell(value, row_no, &headers[col_idx])?);
        }
        rows.push(row);
    }

    FeatureTable::from_rows(columns, rows, labels)
}

fn parse_cell(s: &str, row: usize, col: &str) -> Result<f64> {
    let tok = s.trim();
    if tok.is_empty() {
        bail!("Row {row}, column '{col}': empty cell");
    }
    tok.parse::<f64>()
        .with_context(|| format!("Row {row}, column '{col}': '{tok}' is not a number"))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of numeric features.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`). Integer, float and boolean columns
/// are widened to `f64`; any other type outside `drop_col` is an error.
fn load_parquet(path: &Path, drop_col: &str) -> Result<FeatureTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut columns: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut labels: Option<Vec<String>> = None;
    let mut row_offset = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let drop_idx = schema.index_of(drop_col).ok();

        let feature_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != drop_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        let names: Vec<String> = feature_cols.iter().map(|(_, n)| n.clone()).collect();
        match &columns {
            Some(existing) if *existing != names => {
                bail!("Parquet record batches disagree on column layout")
            }
            Some(_) => {}
            None => columns = Some(names),
        }

        let mut col_values = Vec::with_capacity(feature_cols.len());
        for (idx, name) in &feature_cols {
            col_values.push(
                numeric_column(batch.column(*idx), name)
                    .with_context(|| format!("reading column '{name}'"))?,
            );
        }

        for row in 0..batch.num_rows() {
            let mut values = Vec::with_capacity(col_values.len());
            for (arr, (_, name)) in col_values.iter().zip(&feature_cols) {
                if arr.is_null(row) {
                    bail!("Row {}, column '{name}': null value", row_offset + row);
                }
                values.push(arr.value(row));
            }
            rows.push(values);
        }
        row_offset += batch.num_rows();

        if let Some(idx) = drop_idx {
            let batch_labels = string_column(batch.column(idx))
                .with_context(|| format!("reading label column '{drop_col}'"))?;
            labels.get_or_insert_with(Vec::new).extend(batch_labels);
        }
    }

    FeatureTable::from_rows(columns.unwrap_or_default(), rows, labels)
}

// -- Parquet / Arrow helpers --

/// Widen a numeric or boolean Arrow column to `Float64`.
fn numeric_column(col: &Arc<dyn Array>, name: &str) -> Result<Float64Array> {
    let dt = col.data_type();
    if !(dt.is_numeric() || *dt == DataType::Boolean) {
        bail!("Column '{name}' has non-numeric type {dt:?}");
    }
    let widened = cast(col.as_ref(), &DataType::Float64).context("casting to Float64")?;
    widened
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .context("expected Float64Array after cast")
}

/// Render any Arrow column as strings (labels may be text or integer codes).
fn string_column(col: &Arc<dyn Array>) -> Result<Vec<String>> {
    let as_text = cast(col.as_ref(), &DataType::Utf8).context("casting to Utf8")?;
    let strings = as_text
        .as_any()
        .downcast_ref::<StringArray>()
        .context("expected StringArray after cast")?;
    Ok(strings
        .iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

/// Write `table` as Parquet: one `Float64` column per feature, plus a
/// `Utf8` column named `label_col` when the table has labels.
pub fn write_parquet(table: &FeatureTable, path: &Path, label_col: &str) -> Result<()> {
    let mut fields: Vec<Field> = table
        .columns
        .iter()
        .map(|name| Field::new(name.as_str(), DataType::Float64, false))
        .collect();
    let mut arrays: Vec<ArrayRef> = table
        .features
        .columns()
        .into_iter()
        .map(|col| Arc::new(Float64Array::from_iter_values(col.iter().copied())) as ArrayRef)
        .collect();
    if let Some(labels) = &table.labels {
        fields.push(Field::new(label_col, DataType::Utf8, false));
        arrays.push(Arc::new(StringArray::from_iter_values(labels.iter())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use arrow::array::{Float64Array as F64, Int64Array, StringArray as Str};

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_csv_drops_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "t.csv",
            "duration,src_bytes,target\n0,181,normal\n2,239,smurf\n",
        );

        let table = load_table(&path, TARGET_COLUMN).unwrap();
        assert_eq!(table.columns, vec!["duration", "src_bytes"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.features[[1, 1]], 239.0);
        assert_eq!(
            table.labels,
            Some(vec!["normal".to_string(), "smurf".to_string()])
        );
    }

    #[test]
    fn test_load_csv_without_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "a,b\n1,2\n");
        let table = load_table(&path, TARGET_COLUMN).unwrap();
        assert_eq!(table.n_features(), 2);
        assert!(table.labels.is_none());
    }

    #[test]
    fn test_load_csv_rejects_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "a,b\n1,tcp\n");
        let err = load_table(&path, TARGET_COLUMN).unwrap_err();
        assert!(format!("{err:#}").contains("column 'b'"));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(load_table(Path::new("x.xlsx"), TARGET_COLUMN).is_err());
    }

    #[test]
    fn test_load_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("count", DataType::Int64, false),
            Field::new("rate", DataType::Float64, false),
            Field::new(TARGET_COLUMN, DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![3, 5])),
                Arc::new(F64::from(vec![0.25, 1.0])),
                Arc::new(Str::from(vec!["normal", "neptune"])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(&path, TARGET_COLUMN).unwrap();
        assert_eq!(table.columns, vec!["count", "rate"]);
        assert_eq!(table.features[[1, 0]], 5.0);
        assert_eq!(table.features[[0, 1]], 0.25);
        assert_eq!(table.labels.unwrap()[1], "neptune");
    }

    #[test]
    fn test_write_parquet_keeps_labels() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_file(dir.path(), "t.csv", "a,b,target\n1,2,normal\n3,4,smurf\n");
        let table = load_table(&csv, TARGET_COLUMN).unwrap();

        let pq = dir.path().join("t.parquet");
        write_parquet(&table, &pq, TARGET_COLUMN).unwrap();
        let back = load_table(&pq, TARGET_COLUMN).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_parquet_null_reports_file_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nulls.parquet");

        let schema = Arc::new(Schema::new(vec![Field::new("rate", DataType::Float64, true)]));
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), None).unwrap();
        let first =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(F64::from(vec![0.1, 0.2, 0.3]))])
                .unwrap();
        let second =
            RecordBatch::try_new(schema, vec![Arc::new(F64::from(vec![Some(0.4), None]))]).unwrap();
        writer.write(&first).unwrap();
        writer.flush().unwrap();
        writer.write(&second).unwrap();
        writer.close().unwrap();

        let err = load_table(&path, TARGET_COLUMN).unwrap_err();
        assert!(format!("{err:#}").contains("Row 4, column 'rate'"), "{err:#}");
    }

    #[test]
    fn test_partition_paths() {
        let (inl, out) = partition_paths(Path::new("data/kdd"), "train", "all");
        assert_eq!(inl, PathBuf::from("data/kdd/train/all_inliers.csv"));
        assert_eq!(out, PathBuf::from("data/kdd/train/all_outliers.csv"));
    }

    #[test]
    fn test_load_kdd_reuses_scaler() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("train");
        std::fs::create_dir_all(&part).unwrap();
        write_file(&part, "all_inliers.csv", "a,b,target\n0,10,normal\n4,20,normal\n");
        write_file(&part, "all_outliers.csv", "a,b,target\n8,10,smurf\n");

        let opts = KddOptions {
            data_path: dir.path().to_path_buf(),
            dataset_type: "all".into(),
            partition: "train".into(),
        };
        let loaded = load_kdd(&opts, None).unwrap();
        assert_eq!(loaded.columns, vec!["a", "b"]);
        assert!((loaded.inliers[[1, 0]] - 1.0).abs() < 1e-12);
        // outliers use the inlier scaler, so 8 maps past the top of the range
        assert!((loaded.outliers[[0, 0]] - 2.0).abs() < 1e-12);

        let again = load_kdd(&opts, Some(loaded.scaler.clone())).unwrap();
        assert_eq!(again.scaler, loaded.scaler);
    }

    #[test]
    fn test_load_kdd_generates_missing_partition() {
        let dir = tempfile::tempdir().unwrap();
        let opts = KddOptions {
            data_path: dir.path().to_path_buf(),
            dataset_type: "all".into(),
            partition: "test".into(),
        };
        let loaded = load_kdd(&opts, None).unwrap();
        assert!(loaded.inliers.nrows() > 0);
        assert!(loaded.outliers.nrows() > 0);
        assert_eq!(loaded.inliers.ncols(), loaded.columns.len());
        assert!(dir.path().join("test/all_inliers.csv").exists());
    }
}
