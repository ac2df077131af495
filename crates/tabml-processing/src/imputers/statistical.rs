//! Statistical imputation methods.
//!
//! Learns a fill value for one column (mean, median, most frequent, or a
//! constant) and applies it to the column's nulls.

use crate::error::{ProcessingError, Result};
use crate::utils::{
    fill_numeric_nulls, fill_string_nulls, is_numeric_like, numeric_mode, string_mode,
};
use polars::prelude::*;
use serde::Serialize;
use std::fmt;

/// Default constant for numeric columns when no fill value is declared.
pub const DEFAULT_NUMERIC_FILL: f64 = 0.0;

/// Default constant for string columns when no fill value is declared.
pub const DEFAULT_STRING_FILL: &str = "missing_value";

/// A fill value learned from training data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FillValue {
    /// Replaces nulls in a numeric column; a column with nulls becomes `Float64`.
    Numeric(f64),
    /// Replaces nulls in a string column.
    Text(String),
}

impl fmt::Display for FillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillValue::Numeric(v) => write!(f, "{v:.4}"),
            FillValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Mean of the non-null values of a numeric column.
    pub fn mean(series: &Series) -> Result<FillValue> {
        Self::require_numeric(series, "mean")?;
        series
            .mean()
            .map(FillValue::Numeric)
            .ok_or_else(|| ProcessingError::NoValidValues(series.name().to_string()))
    }

    /// Median of the non-null values of a numeric column.
    pub fn median(series: &Series) -> Result<FillValue> {
        Self::require_numeric(series, "median")?;
        // Booleans have no median in polars; go through f64.
        let values = series.cast(&DataType::Float64)?;
        values
            .median()
            .map(FillValue::Numeric)
            .ok_or_else(|| ProcessingError::NoValidValues(series.name().to_string()))
    }

    /// Most frequent non-null value of any column.
    pub fn most_frequent(series: &Series) -> Result<FillValue> {
        let value = if is_numeric_like(series) {
            numeric_mode(series)?.map(FillValue::Numeric)
        } else {
            string_mode(series)?.map(FillValue::Text)
        };
        value.ok_or_else(|| ProcessingError::NoValidValues(series.name().to_string()))
    }

    /// Resolve a declared constant against the column's type.
    ///
    /// Numeric columns accept numbers or numeric strings; string columns take
    /// the string form of any scalar. Without a declared value the defaults
    /// [`DEFAULT_NUMERIC_FILL`] and [`DEFAULT_STRING_FILL`] apply.
    pub fn constant(series: &Series, declared: Option<&serde_json::Value>) -> Result<FillValue> {
        let numeric = is_numeric_like(series);
        let Some(declared) = declared.filter(|v| !v.is_null()) else {
            return Ok(if numeric {
                FillValue::Numeric(DEFAULT_NUMERIC_FILL)
            } else {
                FillValue::Text(DEFAULT_STRING_FILL.to_string())
            });
        };

        if numeric {
            let parsed = match declared {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            parsed.map(FillValue::Numeric).ok_or_else(|| ProcessingError::ImputationFailed {
                column: series.name().to_string(),
                reason: format!("fill value {declared} is not numeric but the column is"),
            })
        } else {
            match declared {
                serde_json::Value::String(s) => Ok(FillValue::Text(s.clone())),
                serde_json::Value::Number(_) | serde_json::Value::Bool(_) => {
                    Ok(FillValue::Text(declared.to_string()))
                }
                _ => Err(ProcessingError::ImputationFailed {
                    column: series.name().to_string(),
                    reason: format!("fill value {declared} must be a scalar"),
                }),
            }
        }
    }

    /// Replace the nulls of `series` with `fill`.
    pub fn apply(series: &Series, fill: &FillValue) -> Result<Series> {
        let filled = match fill {
            FillValue::Numeric(v) => fill_numeric_nulls(series, *v),
            FillValue::Text(s) => fill_string_nulls(series, s),
        };
        filled.map_err(|e| ProcessingError::ImputationFailed {
            column: series.name().to_string(),
            reason: e.to_string(),
        })
    }

    fn require_numeric(series: &Series, method: &str) -> Result<()> {
        if is_numeric_like(series) {
            Ok(())
        } else {
            Err(ProcessingError::ImputationFailed {
                column: series.name().to_string(),
                reason: format!(
                    "{method} imputation requires a numeric column, got {}",
                    series.dtype()
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // mean() / median() tests
    // ========================================================================

    #[test]
    fn test_mean_basic() {
        let s = Series::new("values".into(), &[Some(1.0), None, Some(5.0)]);
        assert_eq!(StatisticalImputer::mean(&s).unwrap(), FillValue::Numeric(3.0));
    }

    #[test]
    fn test_median_basic() {
        let s = Series::new("values".into(), &[Some(1.0), None, Some(3.0), None, Some(10.0)]);
        assert_eq!(StatisticalImputer::median(&s).unwrap(), FillValue::Numeric(3.0));
    }

    #[test]
    fn test_median_integer_column() {
        let s = Series::new("n".into(), &[Some(2i64), Some(4), None]);
        assert_eq!(StatisticalImputer::median(&s).unwrap(), FillValue::Numeric(3.0));
    }

    #[test]
    fn test_mean_all_nulls() {
        let s = Series::new("values".into(), &[Option::<f64>::None, None]);
        let err = StatisticalImputer::mean(&s).unwrap_err();
        assert_eq!(err.error_code(), "NO_VALID_VALUES");
    }

    #[test]
    fn test_mean_rejects_strings() {
        let s = Series::new("city".into(), &[Some("a"), None]);
        let err = StatisticalImputer::mean(&s).unwrap_err();
        assert_eq!(err.error_code(), "IMPUTATION_FAILED");
        assert!(err.to_string().contains("city"));
    }

    // ========================================================================
    // most_frequent() tests
    // ========================================================================

    #[test]
    fn test_most_frequent_numeric() {
        let s = Series::new("n".into(), &[Some(7.0), Some(2.0), Some(7.0), None]);
        assert_eq!(StatisticalImputer::most_frequent(&s).unwrap(), FillValue::Numeric(7.0));
    }

    #[test]
    fn test_most_frequent_string() {
        let s = Series::new("c".into(), &[Some("A"), Some("B"), Some("A"), None]);
        assert_eq!(
            StatisticalImputer::most_frequent(&s).unwrap(),
            FillValue::Text("A".to_string())
        );
    }

    // ========================================================================
    // constant() tests
    // ========================================================================

    #[test]
    fn test_constant_numeric() {
        let s = Series::new("n".into(), &[Some(1.0), None]);
        assert_eq!(
            StatisticalImputer::constant(&s, Some(&json!(-1))).unwrap(),
            FillValue::Numeric(-1.0)
        );
        assert_eq!(
            StatisticalImputer::constant(&s, Some(&json!("2.5"))).unwrap(),
            FillValue::Numeric(2.5)
        );
    }

    #[test]
    fn test_constant_numeric_rejects_text() {
        let s = Series::new("n".into(), &[Some(1.0), None]);
        let err = StatisticalImputer::constant(&s, Some(&json!("abc"))).unwrap_err();
        assert_eq!(err.error_code(), "IMPUTATION_FAILED");
    }

    #[test]
    fn test_constant_defaults() {
        let n = Series::new("n".into(), &[Some(1.0), None]);
        let c = Series::new("c".into(), &[Some("x"), None]);
        assert_eq!(StatisticalImputer::constant(&n, None).unwrap(), FillValue::Numeric(0.0));
        assert_eq!(
            StatisticalImputer::constant(&c, None).unwrap(),
            FillValue::Text("missing_value".to_string())
        );
    }

    #[test]
    fn test_constant_string_column_stringifies_numbers() {
        let c = Series::new("c".into(), &[Some("x"), None]);
        assert_eq!(
            StatisticalImputer::constant(&c, Some(&json!(0))).unwrap(),
            FillValue::Text("0".to_string())
        );
    }

    // ========================================================================
    // apply() tests
    // ========================================================================

    #[test]
    fn test_apply_preserves_original_values() {
        let s = Series::new("values".into(), &[Some(10.0), None, Some(20.0)]);
        let filled = StatisticalImputer::apply(&s, &FillValue::Numeric(15.0)).unwrap();
        let ca = filled.f64().unwrap();
        assert_eq!(ca.get(0), Some(10.0));
        assert_eq!(ca.get(1), Some(15.0));
        assert_eq!(ca.get(2), Some(20.0));
    }

    #[test]
    fn test_apply_text() {
        let s = Series::new("c".into(), &[None, Some("A")]);
        let filled = StatisticalImputer::apply(&s, &FillValue::Text("Z".to_string())).unwrap();
        assert_eq!(filled.str().unwrap().get(0), Some("Z"));
        assert_eq!(filled.str().unwrap().get(1), Some("A"));
    }
}
