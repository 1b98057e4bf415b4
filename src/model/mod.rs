//! Credit default classifier
//!
//! Artifacts are plain JSON (see [`ModelArtifact`]). Loading goes through
//! an ordered chain of sources in [`loader`].

pub mod artifact;
pub mod loader;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Serialize;
use thiserror::Error;

pub use artifact::{Estimator, ModelArtifact};
pub use loader::{ModelLoader, ModelSource};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not readable: {0}")]
    Io(#[from] std::io::Error),

    #[error("model artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model registry request failed: {0}")]
    Registry(#[from] reqwest::Error),

    #[error("model feature order mismatch: expected [{expected}], found [{found}]")]
    FeatureOrderMismatch { expected: String, found: String },

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("source disabled")]
    Disabled,

    #[error("no model source succeeded: {}", .0.join("; "))]
    Exhausted(Vec<String>),

    #[error("model produced a non-finite probability for row {0}")]
    NonFinite(usize),
}

/// Model metadata exposed by `/metadata`
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub source: String,
    pub kind: &'static str,
}

/// Validated, ready-to-serve classifier
#[derive(Debug)]
pub struct LoadedModel {
    info: ModelInfo,
    imputer_medians: Option<Vec<f64>>,
    estimator: Estimator,
}

impl LoadedModel {
    pub fn from_artifact(artifact: ModelArtifact, source: &str) -> Result<Self, ModelError> {
        artifact.validate()?;
        let kind = match artifact.estimator {
            Estimator::Logistic(_) => "logistic",
            Estimator::GradientBoosting(_) => "gradient_boosting",
        };
        Ok(Self {
            info: ModelInfo {
                name: artifact.name,
                version: artifact.version,
                source: source.to_string(),
                kind,
            },
            imputer_medians: artifact.imputer_medians,
            estimator: artifact.estimator,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Fills missing values with the training medians. Without an imputer
    /// the input passes through unchanged.
    pub fn impute(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        if let Some(medians) = &self.imputer_medians {
            for (mut column, median) in out.axis_iter_mut(Axis(1)).zip(medians) {
                column.mapv_inplace(|v| if v.is_nan() { *median } else { v });
            }
        }
        out
    }

    /// Raw margin (log-odds of default)
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let x = self.impute(x);
        match &self.estimator {
            Estimator::Logistic(lr) => lr.decision_function(x.view()),
            Estimator::GradientBoosting(gb) => gb.decision_function(x.view()),
        }
    }

    /// Probability of the positive class (default) per row
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        let proba = self.decision_function(x).mapv(sigmoid);
        if let Some(row) = proba.iter().position(|p| !p.is_finite()) {
            return Err(ModelError::NonFinite(row));
        }
        Ok(proba)
    }

    /// Probability for a single feature vector
    pub fn predict_one(&self, features: &[f64]) -> Result<f64, ModelError> {
        let x = ArrayView2::from_shape((1, features.len()), features)
            .map_err(|e| ModelError::InvalidArtifact(e.to_string()))?;
        Ok(self.predict_proba(x)?[0])
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
