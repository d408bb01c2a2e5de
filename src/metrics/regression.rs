//! Regression Metrics
//!
//! Error metrics over paired truth/prediction sequences. Numeric edge cases
//! (zero division, empty input, degenerate variance) come back as NaN or
//! infinity unless the evaluator runs with [`NumericPolicy::Strict`].

use serde::{Deserialize, Serialize};

use super::registry::Metric;
use crate::error::{validate_same_length, EvalError, Result};

/// How non-finite metric values are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericPolicy {
    /// Return NaN / infinity as the metric value
    #[default]
    Propagate,
    /// Reject non-finite values with [`EvalError::NonFinite`]
    Strict,
}

/// Bounds of the linear weight ramp used by the weighted cumulative error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightRange {
    pub low: f64,
    pub high: f64,
}

impl WeightRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

impl Default for WeightRange {
    fn default() -> Self {
        Self { low: 0.0, high: 1.0 }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

/// Population variance
fn variance(values: &[f64]) -> f64 {
    let m = mean(values.iter().copied());
    mean(values.iter().map(|v| (v - m).powi(2)))
}

/// Mean absolute error
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()))
}

/// Mean squared error
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)))
}

/// Root mean squared error
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mse(y_true, y_pred).sqrt()
}

/// Mean absolute percentage error, in percent
///
/// A zero in `y_true` yields an infinite (or NaN) term which carries into
/// the mean.
pub fn mape(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| ((t - p) / t).abs())) * 100.0
}

pub fn median_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut diffs: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).collect();
    if diffs.is_empty() {
        return f64::NAN;
    }
    diffs.sort_by(f64::total_cmp);

    let mid = diffs.len() / 2;
    if diffs.len() % 2 == 0 {
        (diffs[mid - 1] + diffs[mid]) / 2.0
    } else {
        diffs[mid]
    }
}

pub fn max_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .fold(f64::NAN, f64::max)
}

/// `1 - Var(y_true - y_pred) / Var(y_true)`; NaN for fewer than two points
pub fn explained_variance(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.len() < 2 {
        return f64::NAN;
    }
    let residuals: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();
    1.0 - variance(&residuals) / variance(y_true)
}

/// Coefficient of determination; NaN for fewer than two points
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.len() < 2 {
        return f64::NAN;
    }
    let m = mean(y_true.iter().copied());
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - m).powi(2)).sum();
    1.0 - ss_res / ss_tot
}

/// `n` evenly spaced points from `low` to `high` inclusive
pub fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![low],
        _ => {
            let step = (high - low) / (n - 1) as f64;
            let mut points: Vec<f64> = (0..n).map(|i| low + step * i as f64).collect();
            points[n - 1] = high;
            points
        }
    }
}

/// Sum of absolute errors weighted by a linear ramp over their positions
///
/// A descending range (`low > high`) gives descending weights.
pub fn weighted_cumulative_error(errors: &[f64], range: WeightRange) -> f64 {
    let weights = linspace(range.low, range.high, errors.len());
    errors.iter().zip(&weights).map(|(e, w)| e.abs() * w).sum()
}

/// Computes single metric values under a numeric policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricEvaluator {
    pub policy: NumericPolicy,
    pub weight_range: WeightRange,
}

impl MetricEvaluator {
    pub fn new(policy: NumericPolicy, weight_range: WeightRange) -> Self {
        Self { policy, weight_range }
    }

    pub fn strict() -> Self {
        Self {
            policy: NumericPolicy::Strict,
            ..Default::default()
        }
    }

    /// Evaluate a metric by registry name
    pub fn evaluate_named(&self, name: &str, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        let metric: Metric = name.parse()?;
        self.evaluate(metric, y_true, y_pred)
    }

    /// Evaluate a metric over aligned truth and prediction sequences
    ///
    /// For [`Metric::Wce`] the signed errors `y_pred - y_true` are weighted in
    /// input order.
    pub fn evaluate(&self, metric: Metric, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        validate_same_length(y_true, y_pred)?;

        let value = match metric {
            Metric::Mae => mae(y_true, y_pred),
            Metric::Mse => mse(y_true, y_pred),
            Metric::Rmse => rmse(y_true, y_pred),
            Metric::Mape => mape(y_true, y_pred),
            Metric::MedianAbsoluteError => median_absolute_error(y_true, y_pred),
            Metric::MaxError => max_error(y_true, y_pred),
            Metric::ExplainedVariance => explained_variance(y_true, y_pred),
            Metric::R2Score => r2_score(y_true, y_pred),
            Metric::Wce => {
                let errors: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| p - t).collect();
                weighted_cumulative_error(&errors, self.weight_range)
            }
        };

        self.apply_policy(metric, value)
    }

    /// Weighted cumulative error of an already computed error series
    pub fn evaluate_errors(&self, errors: &[f64]) -> Result<f64> {
        let value = weighted_cumulative_error(errors, self.weight_range);
        self.apply_policy(Metric::Wce, value)
    }

    fn apply_policy(&self, metric: Metric, value: f64) -> Result<f64> {
        match self.policy {
            NumericPolicy::Strict if !value.is_finite() => Err(EvalError::NonFinite {
                metric: metric.to_string(),
                value,
            }),
            _ => Ok(value),
        }
    }
}

/// Evaluate a metric by name with the default (propagating) evaluator
pub fn evaluate(metric_name: &str, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    MetricEvaluator::default().evaluate_named(metric_name, y_true, y_pred)
}
