use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ID_COLUMN: &str = "id";
pub const MODEL_SET_COLUMN: &str = "model_set";
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "scheduleDateTime";

/// One evaluated instance: model output joined with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub scheduled_at: DateTime<Utc>,
    /// Data split label, e.g. "train" or "test"
    pub model_set: String,
    pub y: f64,
    pub yhat: f64,
    /// Signed error `yhat - y`
    pub error: f64,
    /// Additional metadata columns usable as group keys
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl PredictionRecord {
    pub fn new(
        id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        model_set: impl Into<String>,
        y: f64,
        yhat: f64,
    ) -> Self {
        Self {
            id: id.into(),
            scheduled_at,
            model_set: model_set.into(),
            y,
            yhat,
            error: yhat - y,
            extra: BTreeMap::new(),
        }
    }
}

/// Table of prediction records with named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTable {
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub timestamp_column: String,
    /// Extra column names in the order they were loaded or derived
    pub extra_columns: Vec<String>,
    pub records: Vec<PredictionRecord>,
}

fn default_id_column() -> String {
    ID_COLUMN.to_string()
}

impl PredictionTable {
    pub fn new(records: Vec<PredictionRecord>) -> Self {
        Self::with_metadata_columns(ID_COLUMN, DEFAULT_TIMESTAMP_COLUMN, records)
    }

    /// Table whose id and timestamp are exposed under the given column names
    pub fn with_metadata_columns(
        id_column: impl Into<String>,
        timestamp_column: impl Into<String>,
        records: Vec<PredictionRecord>,
    ) -> Self {
        let mut extra_columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.extra.keys() {
                if !extra_columns.contains(key) {
                    extra_columns.push(key.clone());
                }
            }
        }

        Self {
            id_column: id_column.into(),
            timestamp_column: timestamp_column.into(),
            extra_columns,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All column names that can be used as group keys
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![
            self.id_column.clone(),
            self.timestamp_column.clone(),
            MODEL_SET_COLUMN.to_string(),
        ];
        columns.extend(self.extra_columns.iter().cloned());
        columns
    }

    /// Render a record's value for a group column
    pub fn value(&self, record: &PredictionRecord, column: &str) -> Option<String> {
        if column == self.id_column {
            Some(record.id.clone())
        } else if column == MODEL_SET_COLUMN {
            Some(record.model_set.clone())
        } else if column == self.timestamp_column {
            Some(format_timestamp(&record.scheduled_at))
        } else {
            record.extra.get(column).cloned()
        }
    }

    /// Replace the id or `model_set` values, or add (or replace) an extra column
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        if name == self.id_column {
            for (record, value) in self.records.iter_mut().zip(values) {
                record.id = value;
            }
        } else if name == MODEL_SET_COLUMN {
            for (record, value) in self.records.iter_mut().zip(values) {
                record.model_set = value;
            }
        } else {
            self.set_extra_column(name, values);
        }
    }

    /// Add (or replace) an extra column, one value per record
    pub fn set_extra_column(&mut self, name: &str, values: Vec<String>) {
        for (record, value) in self.records.iter_mut().zip(values) {
            record.extra.insert(name.to_string(), value);
        }
        if !self.extra_columns.iter().any(|c| c == name) {
            self.extra_columns.push(name.to_string());
        }
    }

    pub fn y(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.y).collect()
    }

    pub fn yhat(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.yhat).collect()
    }

    /// Concatenate tables sharing the same metadata columns
    pub fn concat(tables: Vec<PredictionTable>) -> Self {
        let (id_column, timestamp_column) = tables
            .first()
            .map(|t| (t.id_column.clone(), t.timestamp_column.clone()))
            .unwrap_or_else(|| (default_id_column(), DEFAULT_TIMESTAMP_COLUMN.to_string()));
        let records = tables.into_iter().flat_map(|t| t.records).collect();
        Self::with_metadata_columns(id_column, timestamp_column, records)
    }
}

/// Timestamps render as RFC 3339 in UTC so string order is time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One long-format metrics row: group values, metric name, value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub group: Vec<String>,
    pub metric: String,
    pub value: f64,
}

/// Long-format metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsTable {
    pub group_columns: Vec<String>,
    pub rows: Vec<MetricRow>,
}

impl MetricsTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a value by group key and metric name
    pub fn get(&self, group: &[&str], metric: &str) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.metric == metric && r.group.iter().map(String::as_str).eq(group.iter().copied()))
            .map(|r| r.value)
    }

    /// Rows as flat JSON objects keyed by column name
    pub fn to_json_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (column, value) in self.group_columns.iter().zip(&row.group) {
                    obj.insert(column.clone(), serde_json::Value::String(value.clone()));
                }
                obj.insert("variable".to_string(), serde_json::Value::String(row.metric.clone()));
                // NaN and infinities have no JSON number form
                let value = serde_json::Number::from_f64(row.value)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(row.value.to_string()));
                obj.insert("value".to_string(), value);
                serde_json::Value::Object(obj)
            })
            .collect()
    }
}
