//! Shared utilities for dataset handling and imputation.

use polars::prelude::*;
use std::collections::BTreeMap;

// =============================================================================
// Token Utilities
// =============================================================================

/// Normalize a configuration token for case-insensitive matching.
///
/// Lowercases, trims, and maps spaces and hyphens to underscores so
/// `"Corr With-Target"` becomes `"corr_with_target"`.
pub fn normalize_token(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a data type for imputation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Boolean type
    Boolean,
    /// String/text type
    String,
    /// Other/unknown types
    Other,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
        DtypeCategory::String
    } else {
        DtypeCategory::Other
    }
}

/// Whether a series can be treated as a numeric column (booleans count as 0/1).
pub fn is_numeric_like(series: &Series) -> bool {
    matches!(
        get_dtype_category(series.dtype()),
        DtypeCategory::Numeric | DtypeCategory::Boolean
    )
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Non-null values of a numeric-like series as `f64`.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().flatten().collect())
}

/// Most frequent non-null numeric value; ties resolve to the smallest value.
pub fn numeric_mode(series: &Series) -> PolarsResult<Option<f64>> {
    let mut values = numeric_values(series)?;
    if values.is_empty() {
        return Ok(None);
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let mut best = (values[0], 0usize);
    let mut run = (values[0], 0usize);
    for v in values {
        if v == run.0 {
            run.1 += 1;
        } else {
            run = (v, 1);
        }
        if run.1 > best.1 {
            best = run;
        }
    }
    Ok(Some(best.0))
}

/// Most frequent non-null string value; ties resolve to the lexicographically
/// smallest value.
pub fn string_mode(series: &Series) -> PolarsResult<Option<String>> {
    let cast = series.cast(&DataType::String)?;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for val in cast.str()?.into_iter().flatten() {
        *counts.entry(val).or_insert(0) += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (val, count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((val, count));
        }
    }
    Ok(best.map(|(val, _)| val.to_string()))
}

// =============================================================================
// Null Filling Utilities
// =============================================================================

/// Fill nulls in a numeric-like series, producing a `Float64` series.
///
/// A series without nulls is returned unchanged, dtype included.
pub fn fill_numeric_nulls(series: &Series, value: f64) -> PolarsResult<Series> {
    if series.null_count() == 0 {
        return Ok(series.clone());
    }
    let cast = series.cast(&DataType::Float64)?;
    let filled: Float64Chunked = cast
        .f64()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(series.name().clone()).into_series())
}

/// Fill nulls in a series with a string value, producing a `String` series.
///
/// A series without nulls is returned unchanged.
pub fn fill_string_nulls(series: &Series, value: &str) -> PolarsResult<Series> {
    if series.null_count() == 0 {
        return Ok(series.clone());
    }
    let cast = series.cast(&DataType::String)?;
    let filled: StringChunked = cast
        .str()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(value)))
        .collect();
    Ok(filled.with_name(series.name().clone()).into_series())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("Corr With Target"), "corr_with_target");
        assert_eq!(normalize_token(" tree-based "), "tree_based");
        assert_eq!(normalize_token("PCA"), "pca");
    }

    #[test]
    fn test_dtype_category() {
        assert_eq!(get_dtype_category(&DataType::Int32), DtypeCategory::Numeric);
        assert_eq!(get_dtype_category(&DataType::Boolean), DtypeCategory::Boolean);
        assert_eq!(get_dtype_category(&DataType::String), DtypeCategory::String);
    }

    #[test]
    fn test_numeric_mode_tie_breaks_to_smallest() {
        let s = Series::new("x".into(), &[Some(3.0), Some(1.0), None, Some(3.0), Some(1.0)]);
        assert_eq!(numeric_mode(&s).unwrap(), Some(1.0));
    }

    #[test]
    fn test_numeric_mode_all_null() {
        let s = Series::new("x".into(), &[Option::<f64>::None, None]);
        assert_eq!(numeric_mode(&s).unwrap(), None);
    }

    #[test]
    fn test_string_mode() {
        let s = Series::new("c".into(), &[Some("b"), Some("a"), Some("b"), None]);
        assert_eq!(string_mode(&s).unwrap(), Some("b".to_string()));

        let tie = Series::new("c".into(), &[Some("z"), Some("y")]);
        assert_eq!(string_mode(&tie).unwrap(), Some("y".to_string()));
    }

    #[test]
    fn test_fill_numeric_nulls_casts_integers() {
        let s = Series::new("n".into(), &[Some(1i64), None, Some(3)]);
        let filled = fill_numeric_nulls(&s, 2.0).unwrap();
        assert_eq!(filled.dtype(), &DataType::Float64);
        assert_eq!(filled.null_count(), 0);
        assert_eq!(filled.f64().unwrap().get(1), Some(2.0));
        assert_eq!(filled.name().as_str(), "n");
    }

    #[test]
    fn test_fill_numeric_nulls_keeps_complete_series() {
        let s = Series::new("n".into(), &[1i64, 2, 3]);
        let filled = fill_numeric_nulls(&s, 0.0).unwrap();
        assert_eq!(filled.dtype(), &DataType::Int64);
        assert!(filled.equals(&s));
    }

    #[test]
    fn test_fill_string_nulls() {
        let s = Series::new("c".into(), &[Some("a"), None]);
        let filled = fill_string_nulls(&s, "missing").unwrap();
        assert_eq!(filled.str().unwrap().get(1), Some("missing"));
    }
}
