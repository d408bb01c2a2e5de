//! Supported metric identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EvalError;

/// Registered regression metrics, in registry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Mae,
    Mse,
    Rmse,
    Mape,
    MedianAbsoluteError,
    MaxError,
    ExplainedVariance,
    R2Score,
    Wce,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Mae,
        Metric::Mse,
        Metric::Rmse,
        Metric::Mape,
        Metric::MedianAbsoluteError,
        Metric::MaxError,
        Metric::ExplainedVariance,
        Metric::R2Score,
        Metric::Wce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Mae => "mae",
            Metric::Mse => "mse",
            Metric::Rmse => "rmse",
            Metric::Mape => "mape",
            Metric::MedianAbsoluteError => "median_absolute_error",
            Metric::MaxError => "max_error",
            Metric::ExplainedVariance => "explained_variance",
            Metric::R2Score => "r2_score",
            Metric::Wce => "wce",
        }
    }

    /// Whether larger values mean a better model
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::ExplainedVariance | Metric::R2Score)
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::ALL.iter().map(|m| m.as_str())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EvalError::UnsupportedMetric(s.to_string()))
    }
}

/// Check a metric name against the registry
pub fn validate(name: &str) -> Result<Metric, EvalError> {
    name.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order() {
        let names: Vec<&str> = Metric::names().collect();
        assert_eq!(
            names,
            vec![
                "mae",
                "mse",
                "rmse",
                "mape",
                "median_absolute_error",
                "max_error",
                "explained_variance",
                "r2_score",
                "wce"
            ]
        );
    }

    #[test]
    fn test_validate() {
        for name in Metric::names() {
            assert_eq!(validate(name).unwrap().as_str(), name);
        }
        assert!(matches!(
            validate("accuracy"),
            Err(EvalError::UnsupportedMetric(n)) if n == "accuracy"
        ));
        // Names are case sensitive
        assert!(validate("MAE").is_err());
    }

    #[test]
    fn test_serde_names_match_registry() {
        let json = serde_json::to_string(&Metric::MedianAbsoluteError).unwrap();
        assert_eq!(json, "\"median_absolute_error\"");
        let metric: Metric = serde_json::from_str("\"r2_score\"").unwrap();
        assert_eq!(metric, Metric::R2Score);
    }
}
