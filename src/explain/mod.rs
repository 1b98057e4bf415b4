//! Feature attributions for the credit model
//!
//! ```text
//!  engine (linear | permutation) ──► RawAttribution ──► shape decoder ──► (n × p) matrix
//!                                                                             │
//!                                        local: ranked rows ◄─────────────────┤
//!                                        global: mean |phi| (cached) ◄────────┘
//! ```

pub mod engine;
pub mod report;
pub mod shape;

use ndarray::{Array2, ArrayView2};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ModelError;
use crate::schema::FEATURE_COUNT;

pub use engine::{engine_for, Attribution, AttributionEngine};
pub use report::{ContributionRow, Direction, GlobalImportanceRow};
pub use shape::{positive_class_matrix, Layout, RawAttribution};

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error(
        "unexpected attribution shape {shape:?}: expected (n, p), (n, p, 2), (2, n, p) \
         or (n, 2, p) with n={n_samples}, p={n_features}"
    )]
    UnrecognizedShape {
        shape: Vec<usize>,
        n_samples: usize,
        n_features: usize,
    },

    #[error("unexpected attribution rank {ndim} (shape {shape:?})")]
    UnsupportedRank { ndim: usize, shape: Vec<usize> },

    #[error("attribution engine returned an empty per-class list")]
    EmptyClassList,

    #[error("expected {expected} attribution values, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("attribution background sample is empty")]
    EmptyBackground,

    #[error("no attribution engine for {0} models")]
    UnsupportedModel(&'static str),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Local explanation of one client
#[derive(Debug, Clone)]
pub struct LocalExplanation {
    pub base_value: f64,
    pub contributions: Vec<ContributionRow>,
}

/// Engine plus the fixed background sample it explains against
#[derive(Debug)]
pub struct Explainer {
    engine: Box<dyn AttributionEngine>,
    background: Array2<f64>,
    global: OnceCell<Vec<GlobalImportanceRow>>,
}

impl Explainer {
    pub fn new(
        engine: Box<dyn AttributionEngine>,
        background: Array2<f64>,
    ) -> Result<Self, ExplainError> {
        if background.nrows() == 0 {
            return Err(ExplainError::EmptyBackground);
        }
        if background.ncols() != FEATURE_COUNT {
            return Err(ExplainError::LengthMismatch {
                expected: FEATURE_COUNT,
                found: background.ncols(),
            });
        }
        Ok(Self {
            engine,
            background,
            global: OnceCell::new(),
        })
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn background_size(&self) -> usize {
        self.background.nrows()
    }

    /// Attributions for `x`, normalized to `(n, p)` positive-class form
    pub fn attribute(&self, x: ArrayView2<f64>) -> Result<(Array2<f64>, f64), ExplainError> {
        let Attribution { values, base_value } = self.engine.attribute(x)?;
        let matrix = positive_class_matrix(values, x.nrows(), FEATURE_COUNT)?;
        Ok((matrix, base_value))
    }

    /// Baseline plus the `top_n` strongest contributions for one client
    pub fn explain_one(
        &self,
        features: &[f64],
        feature_values: &Map<String, Value>,
        top_n: usize,
    ) -> Result<LocalExplanation, ExplainError> {
        let x = ArrayView2::from_shape((1, features.len()), features)?;
        let (matrix, base_value) = self.attribute(x)?;
        let attributions = matrix.row(0).to_vec();
        Ok(LocalExplanation {
            base_value,
            contributions: report::top_contributions(feature_values, &attributions, top_n)?,
        })
    }

    /// Mean |attribution| over the background sample. Computed on first
    /// call, then served from cache for the life of the explainer.
    pub fn global_importance(
        &self,
        top_n: usize,
    ) -> Result<Vec<GlobalImportanceRow>, ExplainError> {
        let rows = self.global.get_or_try_init(|| {
            tracing::info!(
                "Computing global importance over {} background rows ({} engine)",
                self.background.nrows(),
                self.engine.name()
            );
            let (matrix, _) = self.attribute(self.background.view())?;
            report::global_importance(matrix.view())
        })?;
        Ok(rows.iter().take(top_n).cloned().collect())
    }
}
