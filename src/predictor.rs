use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{EvalError, Result};

/// Row-major feature matrix extracted from a data frame
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    n_rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from row vectors; every row must have one value per column
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            if row.len() != columns.len() {
                return Err(EvalError::InputLengthMismatch {
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            columns,
            n_rows: rows.len(),
            data,
        })
    }

    /// Extract numeric feature columns; nulls become NaN
    pub fn from_frame<S: AsRef<str>>(df: &DataFrame, feature_columns: &[S]) -> Result<Self> {
        let mut by_column: Vec<Vec<f64>> = Vec::with_capacity(feature_columns.len());
        for name in feature_columns {
            let name = name.as_ref();
            let column = df
                .column(name)
                .map_err(|_| EvalError::UnknownColumn(name.to_string()))?
                .cast(&DataType::Float64)?;
            let values = column.f64()?;
            by_column.push(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect());
        }

        let n_rows = df.height();
        let mut data = Vec::with_capacity(n_rows * by_column.len());
        for i in 0..n_rows {
            for column in &by_column {
                data.push(column[i]);
            }
        }

        Ok(Self {
            columns: feature_columns.iter().map(|c| c.as_ref().to_string()).collect(),
            n_rows,
            data,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let n = self.n_cols();
        &self.data[i * n..(i + 1) * n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Regression model producing one prediction per feature row, in row order
pub trait Model {
    fn name(&self) -> &str;

    fn predict(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Baseline that predicts the training target mean for every row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanRegressor {
    pub mean: f64,
}

impl MeanRegressor {
    pub fn fit(target: &[f64]) -> Result<Self> {
        if target.is_empty() {
            return Err(EvalError::EmptyInput("cannot fit on an empty target".to_string()));
        }
        let mean = target.iter().sum::<f64>() / target.len() as f64;
        Ok(Self { mean })
    }
}

impl Model for MeanRegressor {
    fn name(&self) -> &str {
        "mean"
    }

    fn predict(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(vec![self.mean; features.n_rows()])
    }
}

/// Linear model with coefficients stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Feature names the coefficients were fitted on
    #[serde(default)]
    pub features: Option<Vec<String>>,
}

impl LinearRegressor {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EvalError::Model(format!("failed to read {:?}: {}", path, e)))?;
        let model: Self = serde_json::from_str(&text)
            .map_err(|e| EvalError::Model(format!("invalid linear model {:?}: {}", path, e)))?;
        info!(
            "Loaded linear model with {} coefficients from {:?}",
            model.coefficients.len(),
            path
        );
        Ok(model)
    }
}

impl Model for LinearRegressor {
    fn name(&self) -> &str {
        "linear"
    }

    fn predict(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_cols() != self.coefficients.len() {
            return Err(EvalError::InputLengthMismatch {
                expected: self.coefficients.len(),
                actual: features.n_cols(),
            });
        }
        if let Some(names) = &self.features {
            if names.as_slice() != features.columns() {
                return Err(EvalError::Model(format!(
                    "feature columns {:?} do not match model features {:?}",
                    features.columns(),
                    names
                )));
            }
        }

        Ok((0..features.n_rows())
            .map(|i| {
                self.intercept
                    + features
                        .row(i)
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(x, w)| x * w)
                        .sum::<f64>()
            })
            .collect())
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxRegressor;

#[cfg(feature = "onnx")]
mod onnx {
    use ort::{
        session::{builder::GraphOptimizationLevel, Session},
        value::Tensor,
    };
    use std::path::Path;
    use tracing::info;

    use super::{FeatureMatrix, Model};
    use crate::error::{EvalError, Result};

    fn model_err<E: std::fmt::Display>(e: E) -> EvalError {
        EvalError::Model(e.to_string())
    }

    const INPUT_NAME: &str = "input";

    /// ONNX regression graph taking a `[rows, features]` f32 tensor named `input`
    pub struct OnnxRegressor {
        session: Session,
    }

    impl OnnxRegressor {
        pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
            let model_path = model_path.as_ref();
            info!("Loading model: {:?}", model_path);

            let session = Session::builder()
                .map_err(model_err)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(model_err)?
                .commit_from_file(model_path)
                .map_err(model_err)?;

            Ok(Self { session })
        }
    }

    impl Model for OnnxRegressor {
        fn name(&self) -> &str {
            "onnx"
        }

        fn predict(&mut self, features: &FeatureMatrix) -> Result<Vec<f64>> {
            let input: Vec<f32> = features.as_slice().iter().map(|&x| x as f32).collect();
            let tensor = Tensor::from_array(([features.n_rows(), features.n_cols()], input))
                .map_err(model_err)?;

            let outputs = self
                .session
                .run(ort::inputs![INPUT_NAME => tensor])
                .map_err(model_err)?;
            let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(model_err)?;

            Ok(data.iter().map(|&v| v as f64).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FeatureMatrix {
        FeatureMatrix::from_rows(
            vec!["distance".to_string(), "runners".to_string()],
            &[vec![1200.0, 8.0], vec![1600.0, 10.0], vec![2000.0, 12.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_feature_matrix_rows() {
        let m = features();
        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.row(1), &[1600.0, 10.0]);
    }

    #[test]
    fn test_feature_matrix_ragged_rows() {
        let result = FeatureMatrix::from_rows(vec!["a".to_string()], &[vec![1.0, 2.0]]);
        assert!(matches!(result, Err(EvalError::InputLengthMismatch { .. })));
    }

    #[test]
    fn test_feature_matrix_from_frame() {
        let df = df!(
            "distance" => &[1200i64, 1600],
            "going" => &[Some(1.5), None],
            "venue" => &["A", "B"]
        )
        .unwrap();

        let m = FeatureMatrix::from_frame(&df, &["distance", "going"]).unwrap();
        assert_eq!(m.row(0), &[1200.0, 1.5]);
        assert!(m.row(1)[1].is_nan());

        let missing = FeatureMatrix::from_frame(&df, &["weight"]);
        assert!(matches!(missing, Err(EvalError::UnknownColumn(c)) if c == "weight"));
    }

    #[test]
    fn test_mean_regressor() {
        let mut model = MeanRegressor::fit(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(model.predict(&features()).unwrap(), vec![20.0; 3]);
        assert!(MeanRegressor::fit(&[]).is_err());
    }

    #[test]
    fn test_linear_regressor() {
        let mut model = LinearRegressor {
            intercept: 1.0,
            coefficients: vec![0.01, 0.5],
            features: None,
        };
        let preds = model.predict(&features()).unwrap();
        assert!((preds[0] - 17.0).abs() < 1e-9);
        assert!((preds[2] - 27.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_regressor_checks_features() {
        let mut model = LinearRegressor {
            intercept: 0.0,
            coefficients: vec![1.0],
            features: None,
        };
        assert!(matches!(
            model.predict(&features()),
            Err(EvalError::InputLengthMismatch { expected: 1, actual: 2 })
        ));

        let mut model = LinearRegressor {
            intercept: 0.0,
            coefficients: vec![1.0, 1.0],
            features: Some(vec!["runners".to_string(), "distance".to_string()]),
        };
        assert!(matches!(model.predict(&features()), Err(EvalError::Model(_))));
    }

    #[test]
    fn test_linear_regressor_from_json() {
        let model: LinearRegressor =
            serde_json::from_str(r#"{"intercept": 2.0, "coefficients": [1.0, -1.0]}"#).unwrap();
        assert_eq!(model.features, None);
        assert_eq!(model.coefficients.len(), 2);
    }
}
