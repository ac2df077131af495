//! Dataset loading and target/feature separation.
//!
//! The learning stage needs a rectangular table addressable by column name,
//! split into a feature frame and a numeric label vector with rows aligned.
//! This module loads that table from disk, separates the target, encodes
//! labels, and partitions rows into train and test sets.

use crate::error::{ProcessingError, Result, ResultExt};
use crate::utils::is_numeric_like;
use polars::prelude::*;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

// =============================================================================
// Loading
// =============================================================================

/// Load a dataset from a `.csv` (header row required) or `.parquet` file.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let df = match extension.as_str() {
        "csv" | "txt" => load_csv_with_fallbacks(path)?,
        "parquet" | "pq" => ParquetReader::new(File::open(path)?)
            .finish()
            .context(format!("Failed to read parquet file {}", path.display()))?,
        other => return Err(ProcessingError::UnsupportedFormat(other.to_string())),
    };

    info!(
        "Loaded dataset {} ({} rows x {} columns)",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

fn load_csv_with_fallbacks(path: &Path) -> Result<DataFrame> {
    // Strategy 1: fast schema inference on the leading rows
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    // Strategy 2: infer the schema from every row
    CsvReadOptions::default()
        .with_infer_schema_length(None)
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .context(format!("Failed to read CSV file {}", path.display()))
}

// =============================================================================
// Labels
// =============================================================================

/// How the target column is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Continuous target, cast to `f64`.
    Continuous,
    /// Categorical target, encoded to class indices.
    Categorical,
}

/// Maps class labels to indices `0..k` in sorted order.
///
/// Numeric labels sort numerically, everything else lexicographically.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    numeric_classes: Option<Vec<f64>>,
}

impl LabelEncoder {
    /// Learn the class set of a label series. Nulls are ignored.
    pub fn fit(series: &Series) -> Result<Self> {
        if is_numeric_like(series) {
            let mut values: Vec<f64> = series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .flatten()
                .collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();
            let classes = values.iter().map(|v| format_class(*v)).collect();
            Ok(Self {
                classes,
                numeric_classes: Some(values),
            })
        } else {
            let cast = series.cast(&DataType::String)?;
            let set: BTreeSet<&str> = cast.str()?.into_iter().flatten().collect();
            Ok(Self {
                classes: set.into_iter().map(str::to_string).collect(),
                numeric_classes: None,
            })
        }
    }

    /// Class labels, indexed by their encoding.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Number of classes.
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Encode a label series. Unknown labels and nulls are errors.
    pub fn transform(&self, series: &Series) -> Result<Vec<f64>> {
        let name = series.name().to_string();
        let unknown = |label: String| ProcessingError::TypeConversionFailed {
            column: name.clone(),
            target_type: "class index".to_string(),
            reason: format!("unknown class label {label}"),
        };

        match &self.numeric_classes {
            Some(values) => series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| {
                    let v = v.ok_or_else(|| unknown("null".to_string()))?;
                    values
                        .binary_search_by(|c| c.total_cmp(&v))
                        .map(|i| i as f64)
                        .map_err(|_| unknown(format_class(v)))
                })
                .collect(),
            None => series
                .cast(&DataType::String)?
                .str()?
                .into_iter()
                .map(|v| {
                    let v = v.ok_or_else(|| unknown("null".to_string()))?;
                    self.classes
                        .binary_search_by(|c| c.as_str().cmp(v))
                        .map(|i| i as f64)
                        .map_err(|_| unknown(v.to_string()))
                })
                .collect(),
        }
    }

    /// Label of an encoded class index, if in range.
    pub fn inverse(&self, index: f64) -> Option<&str> {
        if index < 0.0 || index.fract() != 0.0 {
            return None;
        }
        self.classes.get(index as usize).map(String::as_str)
    }
}

fn format_class(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

// =============================================================================
// Target separation
// =============================================================================

/// Feature frame and aligned label vector separated from a dataset.
#[derive(Debug, Clone)]
pub struct LabeledFrame {
    /// Declared feature columns, in declared order.
    pub features: DataFrame,
    /// Numeric labels aligned with `features` rows.
    pub labels: Vec<f64>,
    /// Name of the target column.
    pub target: String,
    /// Class encoder for categorical targets.
    pub encoder: Option<LabelEncoder>,
}

/// Split `df` into the declared feature columns and an encoded label vector.
///
/// # Errors
///
/// - [`ProcessingError::ColumnNotFound`] if the target or a feature is absent
/// - [`ProcessingError::InvalidConfig`] if the target is also a feature
/// - [`ProcessingError::MissingTargetValues`] if the target has nulls
/// - [`ProcessingError::TypeConversionFailed`] if a continuous target is not numeric
pub fn separate_target(
    df: &DataFrame,
    target: &str,
    feature_columns: &[String],
    kind: TargetKind,
) -> Result<LabeledFrame> {
    if feature_columns.iter().any(|c| c == target) {
        return Err(ProcessingError::InvalidConfig(format!(
            "target column '{target}' is also declared as a feature"
        )));
    }

    let target_series = df
        .column(target)
        .map_err(|_| ProcessingError::ColumnNotFound(target.to_string()))?
        .as_materialized_series()
        .clone();

    let null_count = target_series.null_count();
    if null_count > 0 {
        return Err(ProcessingError::MissingTargetValues {
            column: target.to_string(),
            count: null_count,
        });
    }

    for column in feature_columns {
        if df.column(column).is_err() {
            return Err(ProcessingError::ColumnNotFound(column.clone()));
        }
    }
    let features = df
        .select(feature_columns.iter().map(String::as_str))
        .context("Failed to select feature columns")?;

    let (labels, encoder) = match kind {
        TargetKind::Continuous => {
            let cast = target_series.strict_cast(&DataType::Float64).map_err(|e| {
                ProcessingError::TypeConversionFailed {
                    column: target.to_string(),
                    target_type: "Float64".to_string(),
                    reason: e.to_string(),
                }
            })?;
            let labels: Vec<f64> = cast.f64()?.into_iter().flatten().collect();
            (labels, None)
        }
        TargetKind::Categorical => {
            let encoder = LabelEncoder::fit(&target_series)?;
            let labels = encoder.transform(&target_series)?;
            debug!("Target '{}' encoded into {} classes", target, encoder.n_classes());
            (labels, Some(encoder))
        }
    };

    Ok(LabeledFrame {
        features,
        labels,
        target: target.to_string(),
        encoder,
    })
}

// =============================================================================
// Row partitioning
// =============================================================================

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    /// Rows used for fitting.
    pub train_indices: Vec<usize>,
    /// Held-out rows used for evaluation.
    pub test_indices: Vec<usize>,
}

/// Shuffle `0..n_rows` with `seed` and hold out `ceil(test_size * n_rows)` rows.
pub fn train_test_split(n_rows: usize, test_size: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ProcessingError::InvalidConfig(format!(
            "test_size must be between 0.0 and 1.0 (exclusive), got {test_size}"
        )));
    }

    let n_test = (test_size * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(ProcessingError::InvalidConfig(format!(
            "cannot split {n_rows} rows with test_size {test_size}: \
             both partitions need at least one row"
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train_indices,
        test_indices: indices,
    })
}

/// Gather the given rows of a frame, in the given order.
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = indices.iter().map(|&i| i as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    df.take(&idx).context("Failed to gather rows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "x,y\n1.0,2.0\n,4.0\n3.0,6.0").unwrap();

        let df = load_dataset(file.path()).unwrap();
        assert_eq!(df.shape(), (3, 2));
        assert_eq!(df.column("x").unwrap().null_count(), 1);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let err = load_dataset(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_separate_continuous_target() {
        let df = df![
            "a" => [1.0, 2.0, 3.0],
            "b" => [4i64, 5, 6],
            "y" => [10i64, 20, 30],
        ]
        .unwrap();

        let frame =
            separate_target(&df, "y", &names(&["b", "a"]), TargetKind::Continuous).unwrap();
        assert_eq!(frame.labels, vec![10.0, 20.0, 30.0]);
        let cols: Vec<&str> = frame
            .features
            .get_column_names()
            .iter()
            .map(|s| s.as_str())
            .collect();
        assert_eq!(cols, vec!["b", "a"]);
        assert!(frame.encoder.is_none());
    }

    #[test]
    fn test_separate_categorical_target() {
        let df = df![
            "a" => [1.0, 2.0, 3.0, 4.0],
            "y" => ["dog", "cat", "dog", "bird"],
        ]
        .unwrap();

        let frame = separate_target(&df, "y", &names(&["a"]), TargetKind::Categorical).unwrap();
        let encoder = frame.encoder.unwrap();
        assert_eq!(encoder.classes(), &["bird", "cat", "dog"]);
        assert_eq!(frame.labels, vec![2.0, 1.0, 2.0, 0.0]);
        assert_eq!(encoder.inverse(1.0), Some("cat"));
        assert_eq!(encoder.inverse(7.0), None);
    }

    #[test]
    fn test_numeric_classes_sort_numerically() {
        let s = Series::new("y".into(), &[10i64, 2, 2, 1]);
        let encoder = LabelEncoder::fit(&s).unwrap();
        assert_eq!(encoder.classes(), &["1", "2", "10"]);
        assert_eq!(encoder.transform(&s).unwrap(), vec![2.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_target_errors() {
        let df = df![
            "a" => [1.0, 2.0],
            "y" => [Some(1.0), None],
        ]
        .unwrap();

        let err = separate_target(&df, "missing", &names(&["a"]), TargetKind::Continuous)
            .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");

        let err = separate_target(&df, "y", &names(&["a"]), TargetKind::Continuous).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_TARGET_VALUES");

        let err = separate_target(&df, "a", &names(&["a"]), TargetKind::Continuous).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_non_numeric_continuous_target() {
        let df = df!["a" => [1.0], "y" => ["high"]].unwrap();
        let err = separate_target(&df, "y", &names(&["a"]), TargetKind::Continuous).unwrap_err();
        assert_eq!(err.error_code(), "TYPE_CONVERSION_FAILED");
    }

    #[test]
    fn test_train_test_split_partitions_rows() {
        let split = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(split.test_indices.len(), 2);
        assert_eq!(split.train_indices.len(), 8);

        let mut all: Vec<usize> = split
            .train_indices
            .iter()
            .chain(split.test_indices.iter())
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_test_split_is_reproducible() {
        assert_eq!(train_test_split(50, 0.2, 7).unwrap(), train_test_split(50, 0.2, 7).unwrap());
    }

    #[test]
    fn test_train_test_split_rejects_bad_sizes() {
        assert!(train_test_split(10, 0.0, 1).is_err());
        assert!(train_test_split(10, 1.0, 1).is_err());
        assert!(train_test_split(1, 0.2, 1).is_err());
    }

    #[test]
    fn test_take_rows() {
        let df = df!["a" => [1.0, 2.0, 3.0]].unwrap();
        let taken = take_rows(&df, &[2, 0]).unwrap();
        let a = taken.column("a").unwrap().as_materialized_series().f64().unwrap().clone();
        assert_eq!(a.get(0), Some(3.0));
        assert_eq!(a.get(1), Some(1.0));
    }
}
