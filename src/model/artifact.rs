//! Serialized model artifact

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::schema::{self, FEATURE_COUNT};

/// Trained classifier as exported by the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub version: String,
    /// Must equal the canonical feature order
    pub feature_names: Vec<String>,
    /// Per-feature medians used to fill missing values
    #[serde(default)]
    pub imputer_medians: Option<Vec<f64>>,
    pub estimator: Estimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    Logistic(LogisticRegression),
    GradientBoosting(GradientBoosting),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
}

/// A decision tree node (internal or leaf)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Feature index to compare (internal nodes)
    #[serde(default)]
    pub feature: usize,
    /// Go left when `x[feature] < threshold`
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    /// Direction taken by missing values
    #[serde(default = "default_left")]
    pub default_left: bool,
    /// Leaf value in log-odds (None for internal nodes)
    #[serde(default)]
    pub value: Option<f64>,
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    /// Root first
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Initial prediction in log-odds
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl ModelArtifact {
    /// Checks the artifact against the canonical feature layout
    pub fn validate(&self) -> Result<(), ModelError> {
        let expected: Vec<&str> = schema::feature_names().collect();
        if self.feature_names != expected {
            return Err(ModelError::FeatureOrderMismatch {
                expected: expected.join(","),
                found: self.feature_names.join(","),
            });
        }
        if let Some(medians) = &self.imputer_medians {
            check_len("imputer_medians", medians.len())?;
        }
        match &self.estimator {
            Estimator::Logistic(lr) => lr.validate(),
            Estimator::GradientBoosting(gb) => gb.validate(),
        }
    }

    /// Built-in fallback model: a plain logistic regression on
    /// standardized features
    pub fn stub() -> Self {
        Self {
            name: "stub-logistic".to_string(),
            version: "0".to_string(),
            feature_names: schema::feature_names().map(str::to_string).collect(),
            imputer_medians: Some(vec![
                0.535, 0.566, 0.506, 0.0, -3254.0, -757.0, 2.0, 2.0, -1213.0, -15750.0,
            ]),
            estimator: Estimator::Logistic(LogisticRegression {
                coefficients: vec![-0.52, -0.48, -0.31, 0.08, 0.07, 0.06, 0.09, 0.05, 0.04, 0.12],
                intercept: -2.35,
                scaler: Some(StandardScaler {
                    mean: vec![
                        0.511, 0.514, 0.502, 0.23, -2994.2, -962.9, 2.05, 2.03, -2384.2, -16037.0,
                    ],
                    scale: vec![
                        0.195, 0.191, 0.211, 0.42, 1509.5, 826.8, 0.51, 0.5, 2338.4, 4363.9,
                    ],
                }),
            }),
        }
    }
}

fn check_len(field: &str, len: usize) -> Result<(), ModelError> {
    if len != FEATURE_COUNT {
        return Err(ModelError::InvalidArtifact(format!(
            "{field} has {len} entries, expected {FEATURE_COUNT}"
        )));
    }
    Ok(())
}

impl StandardScaler {
    pub fn transform(&self, x: &mut Array2<f64>) {
        for (mut column, (mean, scale)) in x
            .axis_iter_mut(Axis(1))
            .zip(self.mean.iter().zip(&self.scale))
        {
            column.mapv_inplace(|v| (v - mean) / scale);
        }
    }
}

impl LogisticRegression {
    fn validate(&self) -> Result<(), ModelError> {
        check_len("coefficients", self.coefficients.len())?;
        if let Some(scaler) = &self.scaler {
            check_len("scaler.mean", scaler.mean.len())?;
            check_len("scaler.scale", scaler.scale.len())?;
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(ModelError::InvalidArtifact(
                    "scaler.scale must be finite and non-zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Model-space input: scaled when a scaler is present
    pub fn standardize(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut z = x.to_owned();
        if let Some(scaler) = &self.scaler {
            scaler.transform(&mut z);
        }
        z
    }

    /// Log-odds of the positive class on already imputed input
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let w = Array1::from(self.coefficients.clone());
        self.standardize(x).dot(&w) + self.intercept
    }
}

impl Tree {
    fn validate(&self, index: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidArtifact(format!("tree {index} has no nodes")));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.value.is_some() {
                continue;
            }
            if node.feature >= FEATURE_COUNT {
                return Err(ModelError::InvalidArtifact(format!(
                    "tree {index} node {i} splits on feature {}",
                    node.feature
                )));
            }
            // Children must point forward, which also rules out cycles
            let len = self.nodes.len();
            if node.left <= i || node.right <= i || node.left >= len || node.right >= len {
                return Err(ModelError::InvalidArtifact(format!(
                    "tree {index} node {i} has invalid children ({}, {})",
                    node.left, node.right
                )));
            }
        }
        Ok(())
    }

    /// Leaf value reached by one row
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if let Some(value) = node.value {
                return value;
            }
            let x = row[node.feature];
            let go_left = if x.is_nan() {
                node.default_left
            } else {
                x < node.threshold
            };
            idx = if go_left { node.left } else { node.right };
        }
    }
}

impl GradientBoosting {
    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::InvalidArtifact("ensemble has no trees".to_string()));
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, tree)| tree.validate(i))
    }

    pub fn decision_function(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| {
                let row = row.to_vec();
                self.base_score + self.trees.iter().map(|t| t.predict_row(&row)).sum::<f64>()
            })
            .collect()
    }
}
