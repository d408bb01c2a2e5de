//! Batch metric reports
//!
//! A report computes several metrics at once. Each metric carries its own
//! `Result`; a failing metric is logged and left out of the values without
//! aborting the rest of the batch.

use tracing::warn;

use super::registry::Metric;
use super::regression::MetricEvaluator;
use crate::error::{validate_same_length, EvalError, Result};

/// Pseudo-metric holding the record count
pub const COUNT_KEY: &str = "n";

#[derive(Debug)]
pub struct MetricsReport {
    /// Record count the metrics were computed over
    pub n: usize,
    results: Vec<(String, Result<f64>)>,
}

impl MetricsReport {
    /// Compute metrics with a given evaluator
    ///
    /// `metric_names = None` computes the whole registry in order. Repeated
    /// names are computed once, at their first position. A length mismatch
    /// fails the whole report; any other failure only drops that metric.
    pub fn compute_with(
        evaluator: &MetricEvaluator,
        y_true: &[f64],
        y_pred: &[f64],
        metric_names: Option<&[&str]>,
    ) -> Result<Self> {
        validate_same_length(y_true, y_pred)?;

        let mut names: Vec<&str> = Vec::new();
        match metric_names {
            Some(requested) => {
                for &name in requested {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            None => names.extend(Metric::names().map(|n| -> &str { n })),
        }

        let results = names
            .into_iter()
            .map(|name| {
                let result = evaluator.evaluate_named(name, y_true, y_pred);
                if let Err(e) = &result {
                    warn!("Skipping metric {}: {}", name, e);
                }
                (name.to_string(), result)
            })
            .collect();

        Ok(Self {
            n: y_true.len(),
            results,
        })
    }

    /// Successfully computed metrics, in computation order
    pub fn values(&self) -> Vec<(&str, f64)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.as_ref().ok().map(|v| (name.as_str(), *v)))
            .collect()
    }

    /// Metric values followed by the `n` count entry
    pub fn entries(&self) -> Vec<(&str, f64)> {
        let mut entries = self.values();
        entries.push((COUNT_KEY, self.n as f64));
        entries
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        if name == COUNT_KEY {
            return Some(self.n as f64);
        }
        self.results
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, r)| r.as_ref().ok().copied())
    }

    /// Metrics that failed, with their errors
    pub fn failures(&self) -> Vec<(&str, &EvalError)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }
}

/// Compute a report with the default evaluator
pub fn compute(y_true: &[f64], y_pred: &[f64], metric_names: Option<&[&str]>) -> Result<MetricsReport> {
    MetricsReport::compute_with(&MetricEvaluator::default(), y_true, y_pred, metric_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_all_metrics() {
        let report = compute(&[1.0, 2.0, 3.0], &[1.5, 2.0, 2.0], None).unwrap();

        let names: Vec<&str> = report.values().iter().map(|(n, _)| *n).collect();
        let expected: Vec<&str> = Metric::names().collect();
        assert_eq!(names, expected);
        assert_eq!(report.n, 3);
        assert!(report.is_complete());
    }

    #[test]
    fn test_compute_subset_keeps_requested_order() {
        let report = compute(&[1.0, 2.0], &[2.0, 2.0], Some(&["rmse", "mae"])).unwrap();
        let entries = report.entries();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "rmse");
        assert_eq!(entries[1].0, "mae");
        assert_eq!(entries[2], ("n", 2.0));
        assert!((report.get("mae").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_metric_computed_once() {
        let report = compute(&[1.0, 2.0], &[2.0, 2.0], Some(&["mae", "rmse", "mae"])).unwrap();
        let names: Vec<&str> = report.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["mae", "rmse", "n"]);
    }

    #[test]
    fn test_invalid_metric_is_omitted() {
        let report = compute(
            &[10.0, 20.0],
            &[12.0, 18.0],
            Some(&["mae", "accuracy", "rmse", "mape"]),
        )
        .unwrap();

        let names: Vec<&str> = report.values().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["mae", "rmse", "mape"]);
        assert_eq!(report.get("accuracy"), None);

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "accuracy");
        assert!(matches!(failures[0].1, EvalError::UnsupportedMetric(_)));
        assert!(!report.is_complete());
    }

    #[test]
    fn test_numeric_degeneracy_is_kept() {
        let report = compute(&[0.0, 1.0], &[1.0, 1.0], Some(&["mape", "mae"])).unwrap();
        assert!(report.get("mape").unwrap().is_infinite());
        assert!(report.is_complete());
    }

    #[test]
    fn test_strict_policy_drops_non_finite() {
        let report = MetricsReport::compute_with(
            &MetricEvaluator::strict(),
            &[0.0, 1.0],
            &[1.0, 1.0],
            Some(&["mape", "mae"]),
        )
        .unwrap();

        assert_eq!(report.get("mape"), None);
        assert_eq!(report.get("mae"), Some(0.5));
    }

    #[test]
    fn test_length_mismatch_fails_report() {
        assert!(matches!(
            compute(&[1.0, 2.0], &[1.0], None),
            Err(EvalError::InputLengthMismatch { .. })
        ));
    }
}
