//! Regression metrics
//!
//! Registry of metric identifiers, per-metric evaluation and batch reports.

pub mod registry;
pub mod regression;
pub mod report;

pub use registry::{validate, Metric};
pub use regression::{
    evaluate, explained_variance, linspace, mae, mape, max_error, median_absolute_error, mse,
    r2_score, rmse, weighted_cumulative_error, MetricEvaluator, NumericPolicy, WeightRange,
};
pub use report::{compute, MetricsReport, COUNT_KEY};
