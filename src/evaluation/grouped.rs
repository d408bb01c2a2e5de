//! Grouped Metrics
//!
//! Partition a prediction table by one or more group columns and compute a
//! metrics report per group, reshaped into long format: one row per
//! group × metric, with the `n` count row last in each group.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::time_bucket::with_time_bucket;
use crate::error::{validate_group_columns, EvalError, Result};
use crate::metrics::{MetricEvaluator, MetricsReport};
use crate::models::{MetricRow, MetricsTable, PredictionTable};

/// Computes per-group metric reports
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupedMetricsAggregator {
    evaluator: MetricEvaluator,
}

impl GroupedMetricsAggregator {
    pub fn new(evaluator: MetricEvaluator) -> Self {
        Self { evaluator }
    }

    /// Long-format metrics per distinct group key
    ///
    /// Rows are ordered by group key; within a group metrics keep the order
    /// they were requested in (registry order when `metric_names` is `None`).
    /// Records with no value for a group column are left out.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        table: &PredictionTable,
        group_columns: &[S],
        metric_names: Option<&[&str]>,
    ) -> Result<MetricsTable> {
        if group_columns.is_empty() {
            return Err(EvalError::EmptyInput(
                "at least one group column is required".to_string(),
            ));
        }
        validate_group_columns(group_columns, &table.columns())?;

        let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
        let mut skipped = 0usize;
        for (idx, record) in table.records.iter().enumerate() {
            let key: Option<Vec<String>> = group_columns
                .iter()
                .map(|c| table.value(record, c.as_ref()))
                .collect();
            match key {
                Some(key) => groups.entry(key).or_default().push(idx),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("{} records without a group value were skipped", skipped);
        }

        let mut rows = Vec::new();
        for (key, indices) in &groups {
            let y: Vec<f64> = indices.iter().map(|&i| table.records[i].y).collect();
            let yhat: Vec<f64> = indices.iter().map(|&i| table.records[i].yhat).collect();

            let report = MetricsReport::compute_with(&self.evaluator, &y, &yhat, metric_names)?;
            for (metric, value) in report.entries() {
                rows.push(MetricRow {
                    group: key.clone(),
                    metric: metric.to_string(),
                    value,
                });
            }
        }

        info!(
            "Computed {} metric rows over {} groups",
            rows.len(),
            groups.len()
        );

        Ok(MetricsTable {
            group_columns: group_columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows,
        })
    }

    /// Metrics per group and time bucket
    ///
    /// The bucket column (`alias` or `datetime_<freq>`) is appended to
    /// `group_columns` unless already listed; an alias naming an existing
    /// column replaces its values. The input table is not modified.
    pub fn aggregate_by_datetime<S: AsRef<str>>(
        &self,
        table: &PredictionTable,
        frequency: &str,
        alias: Option<&str>,
        group_columns: &[S],
        metric_names: Option<&[&str]>,
    ) -> Result<MetricsTable> {
        let (bucketed, bucket_column) = with_time_bucket(table, frequency, alias)?;

        let mut columns: Vec<String> = group_columns.iter().map(|c| c.as_ref().to_string()).collect();
        if !columns.contains(&bucket_column) {
            columns.push(bucket_column);
        }

        self.aggregate(&bucketed, &columns, metric_names)
    }
}

/// Grouped metrics with the default evaluator
pub fn aggregate<S: AsRef<str>>(
    table: &PredictionTable,
    group_columns: &[S],
    metric_names: Option<&[&str]>,
) -> Result<MetricsTable> {
    GroupedMetricsAggregator::default().aggregate(table, group_columns, metric_names)
}

/// Metrics by group and time bucket with the default evaluator
pub fn aggregate_by_datetime<S: AsRef<str>>(
    table: &PredictionTable,
    frequency: &str,
    alias: Option<&str>,
    group_columns: &[S],
    metric_names: Option<&[&str]>,
) -> Result<MetricsTable> {
    GroupedMetricsAggregator::default().aggregate_by_datetime(
        table,
        frequency,
        alias,
        group_columns,
        metric_names,
    )
}
