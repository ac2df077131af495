//! Per-feature imputation configuration.
//!
//! A declarative pipeline lists its feature columns in order, each with the
//! rule used to resolve missing values. These types are the deserialized form
//! of that list; the learning crate embeds them in its specification document.

use crate::utils::normalize_token;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Rule for resolving missing values in one feature column.
///
/// Parsing is case-insensitive and treats spaces, hyphens and underscores
/// alike, so `"Most Frequent"` and `"most-frequent"` both parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImputationMethod {
    /// Leave the column untouched.
    #[default]
    None,
    /// Mean of the non-null training values (numeric columns).
    Mean,
    /// Median of the non-null training values (numeric columns).
    Median,
    /// Most frequent non-null training value.
    MostFrequent,
    /// A fixed fill value.
    Constant,
}

impl ImputationMethod {
    /// Canonical name of the rule.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImputationMethod::None => "none",
            ImputationMethod::Mean => "mean",
            ImputationMethod::Median => "median",
            ImputationMethod::MostFrequent => "most_frequent",
            ImputationMethod::Constant => "constant",
        }
    }
}

impl fmt::Display for ImputationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an imputation rule name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid imputation method: '{0}'. \
     Valid values are: none, mean, median, most_frequent, constant"
)]
pub struct ParseImputationError(pub String);

impl FromStr for ImputationMethod {
    type Err = ParseImputationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "none" => Ok(ImputationMethod::None),
            "mean" => Ok(ImputationMethod::Mean),
            "median" => Ok(ImputationMethod::Median),
            "most_frequent" | "mode" => Ok(ImputationMethod::MostFrequent),
            "constant" => Ok(ImputationMethod::Constant),
            _ => Err(ParseImputationError(s.to_string())),
        }
    }
}

impl Serialize for ImputationMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImputationMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One declared feature column and how its missing values are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Column name in the dataset.
    pub column_name: String,

    /// Imputation rule for this column.
    #[serde(default, alias = "imputation_method")]
    pub imputation: ImputationMethod,

    /// Fill value used by [`ImputationMethod::Constant`]; ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<serde_json::Value>,
}

impl FeatureSpec {
    /// Create a feature declaration with the given rule.
    pub fn new(column_name: impl Into<String>, imputation: ImputationMethod) -> Self {
        Self {
            column_name: column_name.into(),
            imputation,
            fill_value: None,
        }
    }

    /// Create a constant-fill feature declaration.
    pub fn constant(column_name: impl Into<String>, fill_value: serde_json::Value) -> Self {
        Self {
            column_name: column_name.into(),
            imputation: ImputationMethod::Constant,
            fill_value: Some(fill_value),
        }
    }
}
