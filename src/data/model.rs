use ndarray::{Array2, ArrayView1, Axis};

// ---------------------------------------------------------------------------
// FeatureTable – a loaded partition file
// ---------------------------------------------------------------------------

/// A numeric feature table (one row per connection record).
///
/// The label column is dropped from `features` at load time and kept
/// aside in `labels` so evaluation code can still inspect it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Ordered feature column names (excludes the label column).
    pub columns: Vec<String>,
    /// Row-major feature matrix, `len() x columns.len()`.
    pub features: Array2<f64>,
    /// Values of the dropped label column, if the file had one.
    pub labels: Option<Vec<String>>,
}

impl FeatureTable {
    /// Build a table from parsed rows. Every row must have `columns.len()` values.
    pub fn from_rows(
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Option<Vec<String>>,
    ) -> anyhow::Result<Self> {
        let n_cols = columns.len();
        let n_rows = rows.len();
        let mut flat = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                anyhow::bail!("Row {i}: expected {n_cols} values, found {}", row.len());
            }
            flat.extend(row);
        }
        let features = Array2::from_shape_vec((n_rows, n_cols), flat)?;
        Ok(FeatureTable {
            columns,
            features,
            labels,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// A single row as a view.
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.index_axis(Axis(0), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let table = FeatureTable::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
            None,
        )
        .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.n_features(), 2);
        assert_eq!(table.row(1).to_vec(), vec![3.0, 4.0]);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_from_rows_ragged() {
        let result = FeatureTable::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![3.0]],
            None,
        );
        assert!(result.is_err());
    }
}
