//! Prediction assembly
//!
//! Run a model over the train/test (and optional validation) splits and join
//! its output with row metadata into a single prediction table.

use polars::prelude::DataFrame;
use tracing::info;

use crate::data::csv_loader::{default_metadata, RecordMeta};
use crate::error::{EvalError, Result};
use crate::models::{PredictionRecord, PredictionTable, DEFAULT_TIMESTAMP_COLUMN, ID_COLUMN};
use crate::predictor::{FeatureMatrix, Model};

pub const TRAIN_SET: &str = "train";
pub const TEST_SET: &str = "test";
pub const VALIDATION_SET: &str = "validation";

/// Feature frame, its target and optional explicit row metadata
pub struct Split {
    pub frame: DataFrame,
    pub target: Vec<f64>,
    pub metadata: Option<Vec<RecordMeta>>,
}

impl Split {
    pub fn new(frame: DataFrame, target: Vec<f64>) -> Self {
        Self {
            frame,
            target,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Vec<RecordMeta>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Joins model output with metadata and a `model_set` label
#[derive(Debug, Clone)]
pub struct PredictionsAssembler {
    pub feature_columns: Vec<String>,
    pub id_column: String,
    pub timestamp_column: String,
}

impl PredictionsAssembler {
    pub fn new(feature_columns: Vec<String>) -> Self {
        Self {
            feature_columns,
            id_column: ID_COLUMN.to_string(),
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
        }
    }

    pub fn with_metadata_columns(
        mut self,
        id_column: impl Into<String>,
        timestamp_column: impl Into<String>,
    ) -> Self {
        self.id_column = id_column.into();
        self.timestamp_column = timestamp_column.into();
        self
    }

    /// Predict one split and label its rows
    pub fn assemble_split(
        &self,
        model: &mut dyn Model,
        split: &Split,
        model_set: &str,
    ) -> Result<Vec<PredictionRecord>> {
        let rows = split.frame.height();
        if split.target.len() != rows {
            return Err(EvalError::InputLengthMismatch {
                expected: rows,
                actual: split.target.len(),
            });
        }

        let metadata = match &split.metadata {
            Some(meta) => meta.clone(),
            None => default_metadata(&split.frame, &self.id_column, &self.timestamp_column)?,
        };
        if metadata.len() != rows {
            return Err(EvalError::InputLengthMismatch {
                expected: rows,
                actual: metadata.len(),
            });
        }

        let features = FeatureMatrix::from_frame(&split.frame, &self.feature_columns)?;
        let predictions = model.predict(&features)?;
        if predictions.len() != rows {
            return Err(EvalError::InputLengthMismatch {
                expected: rows,
                actual: predictions.len(),
            });
        }

        info!(
            "Predicted {} {} rows with {} model",
            rows,
            model_set,
            model.name()
        );

        Ok(metadata
            .into_iter()
            .zip(split.target.iter().zip(predictions))
            .map(|(meta, (&y, yhat))| {
                PredictionRecord::new(meta.id, meta.scheduled_at, model_set, y, yhat)
            })
            .collect())
    }

    /// Prediction table with train rows, then test, then validation
    pub fn make_predictions(
        &self,
        model: &mut dyn Model,
        train: &Split,
        test: &Split,
        validation: Option<&Split>,
    ) -> Result<PredictionTable> {
        let mut records = self.assemble_split(model, train, TRAIN_SET)?;
        records.extend(self.assemble_split(model, test, TEST_SET)?);
        if let Some(validation) = validation {
            records.extend(self.assemble_split(model, validation, VALIDATION_SET)?);
        }

        Ok(PredictionTable::with_metadata_columns(
            self.id_column.clone(),
            self.timestamp_column.clone(),
            records,
        ))
    }
}
