//! Feature Transformers
//!
//! Column transforms applied before training and prediction. Each transformer
//! is split into a `fit` step that returns an immutable fitted state and a
//! `transform` step that applies it to a frame.

use chrono::{Datelike, Timelike};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EvalError, Result};
use crate::evaluation::time_bucket::parse_timestamp;

pub const DAY_OF_WEEK: &str = "dayOfWeek";
pub const HOUR_OF_DAY: &str = "hourOfDay";

/// Placeholder written into missing categorical values
pub const MISSING_FILL: &str = "missing";

fn require_column(df: &DataFrame, name: &str) -> Result<()> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        Ok(())
    } else {
        Err(EvalError::UnknownColumn(name.to_string()))
    }
}

/// Day-of-week and hour-of-day derived from the scheduling timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDateFeatures {
    pub timestamp_column: String,
}

impl ScheduleDateFeatures {
    pub fn output_columns() -> [&'static str; 2] {
        [DAY_OF_WEEK, HOUR_OF_DAY]
    }

    /// Nothing is learned; fitting only checks the timestamp column exists
    pub fn fit(df: &DataFrame, timestamp_column: &str) -> Result<Self> {
        require_column(df, timestamp_column)?;
        Ok(Self {
            timestamp_column: timestamp_column.to_string(),
        })
    }

    /// Frame holding only `dayOfWeek` (Monday = 0) and `hourOfDay`, in UTC
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let column = df
            .column(&self.timestamp_column)
            .map_err(|_| EvalError::UnknownColumn(self.timestamp_column.clone()))?
            .cast(&DataType::String)?;

        let mut days: Vec<Option<i32>> = Vec::with_capacity(df.height());
        let mut hours: Vec<Option<i32>> = Vec::with_capacity(df.height());
        for value in column.str()?.into_iter() {
            match value {
                Some(raw) => {
                    let ts = parse_timestamp(raw).ok_or_else(|| EvalError::InvalidTimestamp {
                        column: self.timestamp_column.clone(),
                        value: raw.to_string(),
                    })?;
                    days.push(Some(ts.weekday().num_days_from_monday() as i32));
                    hours.push(Some(ts.hour() as i32));
                }
                None => {
                    days.push(None);
                    hours.push(None);
                }
            }
        }

        Ok(df!(DAY_OF_WEEK => days, HOUR_OF_DAY => hours)?)
    }
}

/// Fitted fill values per categorical column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFill {
    fills: BTreeMap<String, String>,
}

impl CategoryFill {
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fills.keys().map(String::as_str)
    }

    pub fn fill_value(&self, column: &str) -> Option<&str> {
        self.fills.get(column).map(String::as_str)
    }
}

/// Constant imputation of missing categorical values
pub struct CategoryImputer;

impl CategoryImputer {
    pub fn fit<S: AsRef<str>>(df: &DataFrame, category_columns: &[S]) -> Result<CategoryFill> {
        let mut fills = BTreeMap::new();
        for column in category_columns {
            let column = column.as_ref();
            require_column(df, column)?;
            fills.insert(column.to_string(), MISSING_FILL.to_string());
        }
        Ok(CategoryFill { fills })
    }

    /// Replace nulls in the fitted columns; other columns pass through
    pub fn transform(df: &DataFrame, fill: &CategoryFill) -> Result<DataFrame> {
        for column in fill.columns() {
            require_column(df, column)?;
        }

        let exprs: Vec<Expr> = fill
            .fills
            .iter()
            .map(|(column, value)| {
                col(column.as_str())
                    .cast(DataType::String)
                    .fill_null(lit(value.as_str()))
            })
            .collect();

        Ok(df.clone().lazy().with_columns(exprs).collect()?)
    }
}
