//! CSV loading and conversion between data frames and prediction tables

use polars::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use crate::error::{EvalError, Result};
use crate::evaluation::time_bucket::parse_timestamp;
use crate::models::{
    format_timestamp, MetricsTable, PredictionRecord, PredictionTable, ID_COLUMN, MODEL_SET_COLUMN,
};

pub const Y_COLUMN: &str = "y";
pub const YHAT_COLUMN: &str = "yhat";
pub const ERROR_COLUMN: &str = "error";
/// Long-format column names for the metric name and value
pub const VARIABLE_COLUMN: &str = "variable";
pub const VALUE_COLUMN: &str = "value";

/// Identifier and scheduling time of one row
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMeta {
    pub id: String,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

/// Load a CSV file into a data frame
pub fn read_frame<P: AsRef<Path>>(csv_path: P) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .try_into_reader_with_file_path(Some(csv_path.as_ref().to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Parse CSV content held in memory
pub fn read_frame_from_bytes(bytes: Vec<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Serialize a data frame as CSV with a header row
pub fn frame_to_csv_bytes(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    Ok(buf)
}

fn column_as_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| EvalError::UnknownColumn(name.to_string()))?
        .cast(&DataType::String)?;
    let values = column.str()?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn column_as_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| EvalError::UnknownColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    let values = column.f64()?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

fn column_as_timestamps(df: &DataFrame, name: &str) -> Result<Vec<chrono::DateTime<chrono::Utc>>> {
    column_as_strings(df, name)?
        .into_iter()
        .map(|value| {
            let value = value.unwrap_or_default();
            parse_timestamp(&value).ok_or_else(|| EvalError::InvalidTimestamp {
                column: name.to_string(),
                value,
            })
        })
        .collect()
}

/// Default metadata of a feature frame: its id and timestamp columns
pub fn default_metadata(df: &DataFrame, id_column: &str, timestamp_column: &str) -> Result<Vec<RecordMeta>> {
    let ids = column_as_strings(df, id_column)?;
    let timestamps = column_as_timestamps(df, timestamp_column)?;

    Ok(ids
        .into_iter()
        .zip(timestamps)
        .map(|(id, scheduled_at)| RecordMeta {
            id: id.unwrap_or_default(),
            scheduled_at,
        })
        .collect())
}

/// Reads and writes prediction tables with configurable metadata columns
#[derive(Debug, Clone)]
pub struct PredictionLoader {
    pub id_column: String,
    pub timestamp_column: String,
}

impl Default for PredictionLoader {
    fn default() -> Self {
        Self {
            id_column: ID_COLUMN.to_string(),
            timestamp_column: crate::models::DEFAULT_TIMESTAMP_COLUMN.to_string(),
        }
    }
}

impl PredictionLoader {
    pub fn new(id_column: impl Into<String>, timestamp_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            timestamp_column: timestamp_column.into(),
        }
    }

    /// Convert a frame with id, timestamp, `model_set`, `y` and `yhat` columns
    ///
    /// Any other column except `error` is kept as an extra string column.
    /// The error is always recomputed as `yhat - y`.
    pub fn table_from_frame(&self, df: &DataFrame) -> Result<PredictionTable> {
        let meta = default_metadata(df, &self.id_column, &self.timestamp_column)?;
        let model_sets = column_as_strings(df, MODEL_SET_COLUMN)?;
        let y = column_as_f64(df, Y_COLUMN)?;
        let yhat = column_as_f64(df, YHAT_COLUMN)?;

        let reserved = [
            self.id_column.as_str(),
            self.timestamp_column.as_str(),
            MODEL_SET_COLUMN,
            Y_COLUMN,
            YHAT_COLUMN,
            ERROR_COLUMN,
        ];
        let mut extras: Vec<(String, Vec<Option<String>>)> = Vec::new();
        for name in df.get_column_names() {
            let name = name.to_string();
            if !reserved.contains(&name.as_str()) {
                let values = column_as_strings(df, &name)?;
                extras.push((name, values));
            }
        }

        let mut records = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let mut record = PredictionRecord::new(
                meta[i].id.clone(),
                meta[i].scheduled_at,
                model_sets[i].clone().unwrap_or_default(),
                y[i],
                yhat[i],
            );
            let mut extra = BTreeMap::new();
            for (name, values) in &extras {
                if let Some(value) = &values[i] {
                    extra.insert(name.clone(), value.clone());
                }
            }
            record.extra = extra;
            records.push(record);
        }

        let mut table = PredictionTable::with_metadata_columns(
            self.id_column.clone(),
            self.timestamp_column.clone(),
            records,
        );
        // Keep the frame's column order rather than first-seen order
        table.extra_columns = extras.into_iter().map(|(name, _)| name).collect();
        Ok(table)
    }

    /// Frame with the table's metadata columns, `y`, `yhat`, `error`, `model_set`, then extras
    pub fn table_to_frame(&self, table: &PredictionTable) -> Result<DataFrame> {
        let records = &table.records;
        let mut columns = vec![
            Column::new(
                table.id_column.as_str().into(),
                records.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
            ),
            Column::new(
                table.timestamp_column.as_str().into(),
                records.iter().map(|r| format_timestamp(&r.scheduled_at)).collect::<Vec<_>>(),
            ),
            Column::new(Y_COLUMN.into(), records.iter().map(|r| r.y).collect::<Vec<_>>()),
            Column::new(YHAT_COLUMN.into(), records.iter().map(|r| r.yhat).collect::<Vec<_>>()),
            Column::new(ERROR_COLUMN.into(), records.iter().map(|r| r.error).collect::<Vec<_>>()),
            Column::new(
                MODEL_SET_COLUMN.into(),
                records.iter().map(|r| r.model_set.clone()).collect::<Vec<_>>(),
            ),
        ];
        for name in &table.extra_columns {
            let values: Vec<Option<String>> = records.iter().map(|r| r.extra.get(name).cloned()).collect();
            columns.push(Column::new(name.as_str().into(), values));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Load a prediction table from a local CSV file
    pub fn load<P: AsRef<Path>>(&self, csv_path: P) -> Result<PredictionTable> {
        let df = read_frame(csv_path)?;
        self.table_from_frame(&df)
    }
}

/// Long-format metrics as a frame: group columns, `variable`, `value`
pub fn metrics_to_frame(metrics: &MetricsTable) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(metrics.group_columns.len() + 2);
    for (idx, name) in metrics.group_columns.iter().enumerate() {
        let values: Vec<String> = metrics.rows.iter().map(|r| r.group[idx].clone()).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    columns.push(Column::new(
        VARIABLE_COLUMN.into(),
        metrics.rows.iter().map(|r| r.metric.clone()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        VALUE_COLUMN.into(),
        metrics.rows.iter().map(|r| r.value).collect::<Vec<_>>(),
    ));

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions_frame() -> DataFrame {
        df!(
            "id" => &[101i64, 102, 103],
            "scheduleDateTime" => &["2023-01-01 10:45:00", "2023-01-01 11:05:00", "2023-01-02T09:00:00Z"],
            "y" => &[10i64, 20, 30],
            "yhat" => &[11.0, 18.5, 30.0],
            "error" => &[0.0, 0.0, 0.0],
            "model_set" => &["train", "train", "test"],
            "venue" => &[Some("Ascot"), None, Some("York")]
        )
        .unwrap()
    }

    #[test]
    fn test_table_from_frame() {
        let table = PredictionLoader::default()
            .table_from_frame(&predictions_frame())
            .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.extra_columns, vec!["venue"]);

        let first = &table.records[0];
        assert_eq!(first.id, "101");
        assert_eq!(format_timestamp(&first.scheduled_at), "2023-01-01T10:45:00Z");
        assert_eq!(first.y, 10.0);
        // Stored error column is ignored in favour of yhat - y
        assert!((first.error - 1.0).abs() < 1e-12);
        assert_eq!(first.extra["venue"], "Ascot");
        assert!(table.records[1].extra.get("venue").is_none());
        assert_eq!(table.records[2].model_set, "test");
    }

    #[test]
    fn test_missing_required_column() {
        let df = predictions_frame().drop("yhat").unwrap();
        let result = PredictionLoader::default().table_from_frame(&df);
        assert!(matches!(result, Err(EvalError::UnknownColumn(c)) if c == "yhat"));
    }

    #[test]
    fn test_invalid_timestamp() {
        let df = df!(
            "id" => &[1i64],
            "scheduleDateTime" => &["soon"],
            "y" => &[1.0],
            "yhat" => &[1.0],
            "model_set" => &["test"]
        )
        .unwrap();
        let result = PredictionLoader::default().table_from_frame(&df);
        assert!(matches!(result, Err(EvalError::InvalidTimestamp { .. })));
    }

    #[test]
    fn test_table_to_frame_roundtrip_columns() {
        let loader = PredictionLoader::default();
        let table = loader.table_from_frame(&predictions_frame()).unwrap();
        let df = loader.table_to_frame(&table).unwrap();

        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(
            names,
            vec!["id", "scheduleDateTime", "y", "yhat", "error", "model_set", "venue"]
        );
        assert_eq!(df.height(), 3);

        let back = loader.table_from_frame(&df).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_custom_id_column_is_a_group_column() {
        let mut df = predictions_frame();
        df.rename("id", "race_id".into()).unwrap();
        let loader = PredictionLoader::new("race_id", "scheduleDateTime");
        let table = loader.table_from_frame(&df).unwrap();

        assert_eq!(table.id_column, "race_id");
        assert!(table.columns().contains(&"race_id".to_string()));
        assert!(!table.columns().contains(&"id".to_string()));

        let out = loader.table_to_frame(&table).unwrap();
        assert_eq!(out.get_column_names()[0].as_str(), "race_id");
    }

    #[test]
    fn test_csv_bytes_roundtrip() {
        let mut df = predictions_frame();
        let bytes = frame_to_csv_bytes(&mut df).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("id,scheduleDateTime,y,yhat,error,model_set,venue"));

        let parsed = read_frame_from_bytes(bytes).unwrap();
        assert_eq!(parsed.height(), 3);
        assert_eq!(parsed.width(), 7);
    }

    #[test]
    fn test_metrics_to_frame() {
        use crate::models::MetricRow;

        let metrics = MetricsTable {
            group_columns: vec!["model_set".to_string(), "datetime_H".to_string()],
            rows: vec![
                MetricRow {
                    group: vec!["test".to_string(), "2023-01-01T10:00:00Z".to_string()],
                    metric: "mae".to_string(),
                    value: 1.5,
                },
                MetricRow {
                    group: vec!["test".to_string(), "2023-01-01T10:00:00Z".to_string()],
                    metric: "n".to_string(),
                    value: 2.0,
                },
            ],
        };
        let df = metrics_to_frame(&metrics).unwrap();

        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["model_set", "datetime_H", "variable", "value"]);
        assert_eq!(df.column("value").unwrap().f64().unwrap().get(0), Some(1.5));
    }
}
