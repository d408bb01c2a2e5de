//! Race Eval - Race outcome prediction evaluation
//!
//! This library provides:
//! - Regression error metrics (MAE, RMSE, MAPE, R², weighted cumulative error, ...)
//! - Batch metric reports that tolerate per-metric failures
//! - Metrics grouped by data split and time bucket, in long format
//! - Prediction assembly, feature transformers and local / `gs://` CSV I/O
//!
//! # Example
//!
//! ```no_run
//! use race_eval::evaluation::aggregate_by_datetime;
//! use race_eval::data::PredictionLoader;
//!
//! let table = PredictionLoader::default().load("predictions.csv").unwrap();
//! let metrics = aggregate_by_datetime(&table, "H", None, &["model_set"], Some(&["mae", "rmse"])).unwrap();
//! for row in &metrics.rows {
//!     println!("{:?} {} = {}", row.group, row.metric, row.value);
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod models;
pub mod predictor;

// Re-export commonly used types
pub use config::{EvalConfig, StorageConfig};
pub use error::{EvalError, StorageError};
pub use metrics::{Metric, MetricEvaluator, MetricsReport, NumericPolicy, WeightRange};
pub use models::{MetricRow, MetricsTable, PredictionRecord, PredictionTable};
pub use predictor::{FeatureMatrix, LinearRegressor, MeanRegressor, Model};
