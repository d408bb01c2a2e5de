//! Evaluation and storage configuration
//!
//! Defaults can be overridden through `RACE_EVAL_*` environment variables;
//! command line flags take precedence over both.

use serde::{Deserialize, Serialize};

use crate::metrics::{MetricEvaluator, NumericPolicy, WeightRange};
use crate::models::{DEFAULT_TIMESTAMP_COLUMN, ID_COLUMN, MODEL_SET_COLUMN};

/// Object storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL for public object downloads
    pub endpoint: String,
    /// Base URL of the media upload API
    pub upload_endpoint: String,
    /// OAuth bearer token; anonymous access when unset
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            upload_endpoint: "https://storage.googleapis.com/upload/storage/v1".to_string(),
            access_token: None,
            timeout_secs: 30,
            user_agent: concat!("race-eval/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Evaluation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub id_column: String,
    pub timestamp_column: String,
    pub metrics: Vec<String>,
    pub group_columns: Vec<String>,
    /// Time bucket frequency alias
    pub frequency: String,
    pub weight_range: WeightRange,
    pub numeric_policy: NumericPolicy,
    pub storage: StorageConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            id_column: ID_COLUMN.to_string(),
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            metrics: vec!["mae".to_string(), "mape".to_string(), "rmse".to_string()],
            group_columns: vec![MODEL_SET_COLUMN.to_string()],
            frequency: "H".to_string(),
            weight_range: WeightRange::default(),
            numeric_policy: NumericPolicy::Propagate,
            storage: StorageConfig::default(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl EvalConfig {
    /// Defaults with overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`, keyed by variable name
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("RACE_EVAL_ID_COLUMN") {
            config.id_column = v;
        }
        if let Some(v) = lookup("RACE_EVAL_TIMESTAMP_COLUMN") {
            config.timestamp_column = v;
        }
        if let Some(v) = lookup("RACE_EVAL_METRICS") {
            config.metrics = split_list(&v);
        }
        if let Some(v) = lookup("RACE_EVAL_GROUP_COLUMNS") {
            config.group_columns = split_list(&v);
        }
        if let Some(v) = lookup("RACE_EVAL_FREQ") {
            config.frequency = v;
        }
        if let Some(v) = lookup("RACE_EVAL_WCE_LOW").and_then(|v| v.parse().ok()) {
            config.weight_range.low = v;
        }
        if let Some(v) = lookup("RACE_EVAL_WCE_HIGH").and_then(|v| v.parse().ok()) {
            config.weight_range.high = v;
        }
        if let Some(v) = lookup("RACE_EVAL_STRICT") {
            if matches!(v.as_str(), "1" | "true" | "yes") {
                config.numeric_policy = NumericPolicy::Strict;
            }
        }
        if let Some(v) = lookup("RACE_EVAL_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Some(v) = lookup("RACE_EVAL_UPLOAD_ENDPOINT") {
            config.storage.upload_endpoint = v;
        }
        if let Some(v) = lookup("RACE_EVAL_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.storage.timeout_secs = v;
        }
        if let Some(v) = lookup("GOOGLE_OAUTH_ACCESS_TOKEN") {
            config.storage.access_token = Some(v);
        }

        config
    }

    pub fn evaluator(&self) -> MetricEvaluator {
        MetricEvaluator::new(self.numeric_policy, self.weight_range)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(String::as_str).collect()
    }
}
