//! Feature-wide imputer assembled from per-column rules.
//!
//! [`FeatureImputer`] is the unfitted composite: it knows the declared
//! columns, their order and their rules. [`FeatureImputer::fit`] learns one
//! fill value per column from a training frame and returns a
//! [`FittedFeatureImputer`], which can be applied to any number of frames
//! (the held-out split, cross-validation folds, inference input) without
//! refitting.

use crate::config::{FeatureSpec, ImputationMethod};
use crate::error::{ProcessingError, Result, ResultExt};
use crate::imputers::statistical::{FillValue, StatisticalImputer};
use polars::prelude::*;
use tracing::debug;

/// Unfitted composite imputer over the declared feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImputer {
    features: Vec<FeatureSpec>,
}

impl FeatureImputer {
    /// Assemble an imputer from the declared feature list (order preserved).
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// Declared column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.column_name.clone()).collect()
    }

    /// Check that every declared column exists in `df`.
    pub fn validate_columns(&self, df: &DataFrame) -> Result<()> {
        for feature in &self.features {
            if df.column(&feature.column_name).is_err() {
                return Err(ProcessingError::ColumnNotFound(feature.column_name.clone()));
            }
        }
        Ok(())
    }

    /// Learn fill values from the training frame.
    pub fn fit(&self, df: &DataFrame) -> Result<FittedFeatureImputer> {
        let mut columns = Vec::with_capacity(self.features.len());

        for feature in &self.features {
            let name = &feature.column_name;
            let column = df
                .column(name)
                .map_err(|_| ProcessingError::ColumnNotFound(name.clone()))?;
            let series = column.as_materialized_series();

            let fill = match feature.imputation {
                ImputationMethod::None => None,
                ImputationMethod::Mean => Some(StatisticalImputer::mean(series)?),
                ImputationMethod::Median => Some(StatisticalImputer::median(series)?),
                ImputationMethod::MostFrequent => Some(StatisticalImputer::most_frequent(series)?),
                ImputationMethod::Constant => Some(StatisticalImputer::constant(
                    series,
                    feature.fill_value.as_ref(),
                )?),
            };

            if let Some(fill) = &fill {
                debug!("Imputer for '{}' learned {} = {}", name, feature.imputation, fill);
            }

            columns.push(ColumnImputer {
                column: name.clone(),
                method: feature.imputation,
                fill,
            });
        }

        Ok(FittedFeatureImputer { columns })
    }
}

/// A fitted imputation rule scoped to one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnImputer {
    column: String,
    method: ImputationMethod,
    fill: Option<FillValue>,
}

impl ColumnImputer {
    /// Column this rule applies to.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Declared rule.
    pub fn method(&self) -> ImputationMethod {
        self.method
    }

    /// Learned fill value, `None` for pass-through columns.
    pub fn fill_value(&self) -> Option<&FillValue> {
        self.fill.as_ref()
    }

    fn transform(&self, df: &DataFrame) -> Result<Column> {
        let column = df
            .column(&self.column)
            .map_err(|_| ProcessingError::ColumnNotFound(self.column.clone()))?;

        match &self.fill {
            None => Ok(column.clone()),
            Some(fill) => {
                let filled = StatisticalImputer::apply(column.as_materialized_series(), fill)?;
                Ok(filled.into_column())
            }
        }
    }
}

/// Imputer whose per-column fill values have been learned.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedFeatureImputer {
    columns: Vec<ColumnImputer>,
}

impl FittedFeatureImputer {
    /// Fitted per-column rules in declared order.
    pub fn columns(&self) -> &[ColumnImputer] {
        &self.columns
    }

    /// Learned fill value of a column.
    pub fn fill_value(&self, column: &str) -> Option<&FillValue> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .and_then(|c| c.fill.as_ref())
    }

    /// Produce a frame with exactly the declared columns, in declared order,
    /// with nulls resolved. Undeclared columns of `df` are dropped.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.transform(df))
            .collect::<Result<Vec<_>>>()?;

        DataFrame::new(columns).context("Failed to assemble imputed feature frame")
    }
}
