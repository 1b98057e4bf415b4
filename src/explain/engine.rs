//! Attribution engines

use std::fmt;
use std::sync::Arc;

use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::shape::RawAttribution;
use super::ExplainError;
use crate::config::Config;
use crate::model::{Estimator, LoadedModel};

/// Engine output before shape normalization
#[derive(Debug, Clone)]
pub struct Attribution {
    pub values: RawAttribution,
    /// Expected model output over the background, positive class
    pub base_value: f64,
}

pub trait AttributionEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Attributions for every row of `x` (canonical feature order)
    fn attribute(&self, x: ArrayView2<f64>) -> Result<Attribution, ExplainError>;
}

/// Picks the engine matching the model family
pub fn engine_for(
    model: Arc<LoadedModel>,
    background: ArrayView2<f64>,
    config: &Config,
) -> Result<Box<dyn AttributionEngine>, ExplainError> {
    match model.estimator() {
        Estimator::Logistic(_) => Ok(Box::new(LinearExplainer::new(model, background)?)),
        Estimator::GradientBoosting(_) => Ok(Box::new(PermutationExplainer::new(
            model,
            background,
            config.explainer_masker_size,
            config.explainer_permutations,
            config.random_seed,
        )?)),
    }
}

/// Exact interventional attributions for logistic models, in log-odds.
/// `phi_j = w_j * (z_j - E[z_j])` where `z` is the imputed, scaled input.
pub struct LinearExplainer {
    model: Arc<LoadedModel>,
    coefficients: Array1<f64>,
    background_mean: Array1<f64>,
    base_value: f64,
}

impl LinearExplainer {
    pub fn new(model: Arc<LoadedModel>, background: ArrayView2<f64>) -> Result<Self, ExplainError> {
        let Estimator::Logistic(lr) = model.estimator() else {
            return Err(ExplainError::UnsupportedModel(model.info().kind));
        };
        let z = lr.standardize(model.impute(background).view());
        let background_mean = z.mean_axis(Axis(0)).ok_or(ExplainError::EmptyBackground)?;
        let coefficients = Array1::from(lr.coefficients.clone());
        let base_value = lr.intercept + coefficients.dot(&background_mean);

        Ok(Self {
            model,
            coefficients,
            background_mean,
            base_value,
        })
    }
}

impl fmt::Debug for LinearExplainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearExplainer")
            .field("model", &self.model.info().name)
            .field("base_value", &self.base_value)
            .finish()
    }
}

impl AttributionEngine for LinearExplainer {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn attribute(&self, x: ArrayView2<f64>) -> Result<Attribution, ExplainError> {
        let Estimator::Logistic(lr) = self.model.estimator() else {
            return Err(ExplainError::UnsupportedModel(self.model.info().kind));
        };
        let z = lr.standardize(self.model.impute(x).view());
        let phi = (z - &self.background_mean) * &self.coefficients;
        Ok(Attribution {
            values: RawAttribution::Array(phi.into_dyn()),
            base_value: self.base_value,
        })
    }
}

/// Model-agnostic attributions by antithetic permutation sampling of the
/// default probability. Features outside the current coalition take
/// values from masker rows. Emits `(n, p, 2)`; class 0 is the negation of
/// class 1.
pub struct PermutationExplainer {
    model: Arc<LoadedModel>,
    masker: Array2<f64>,
    permutations: usize,
    seed: u64,
    base_value: f64,
}

impl PermutationExplainer {
    pub fn new(
        model: Arc<LoadedModel>,
        background: ArrayView2<f64>,
        masker_size: usize,
        permutations: usize,
        seed: u64,
    ) -> Result<Self, ExplainError> {
        let rows = masker_size.clamp(1, background.nrows().max(1));
        let masker = background.slice(s![..rows.min(background.nrows()), ..]).to_owned();
        if masker.nrows() == 0 {
            return Err(ExplainError::EmptyBackground);
        }
        let base_value = model
            .predict_proba(masker.view())?
            .mean()
            .ok_or(ExplainError::EmptyBackground)?;

        Ok(Self {
            model,
            masker,
            permutations: permutations.max(1),
            seed,
            base_value,
        })
    }

    /// Adds one permutation's marginal contributions into `phi`
    fn walk(
        &self,
        row: ArrayView1<f64>,
        order: &[usize],
        phi: &mut Array1<f64>,
    ) -> Result<(), ExplainError> {
        let m = self.masker.nrows();
        let p = row.len();

        // Block k holds the masker with the first k features of `order` fixed to `row`
        let mut batch = Array2::<f64>::zeros(((p + 1) * m, p));
        for k in 0..=p {
            let mut block = batch.slice_mut(s![k * m..(k + 1) * m, ..]);
            block.assign(&self.masker);
            for &j in &order[..k] {
                block.column_mut(j).fill(row[j]);
            }
        }

        let proba = self.model.predict_proba(batch.view())?;
        let means: Vec<f64> = proba
            .exact_chunks(m)
            .into_iter()
            .map(|chunk| chunk.sum() / m as f64)
            .collect();

        for (k, &j) in order.iter().enumerate() {
            phi[j] += means[k + 1] - means[k];
        }
        Ok(())
    }
}

impl fmt::Debug for PermutationExplainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermutationExplainer")
            .field("model", &self.model.info().name)
            .field("masker_rows", &self.masker.nrows())
            .field("permutations", &self.permutations)
            .finish()
    }
}

impl AttributionEngine for PermutationExplainer {
    fn name(&self) -> &'static str {
        "permutation"
    }

    fn attribute(&self, x: ArrayView2<f64>) -> Result<Attribution, ExplainError> {
        let (n, p) = x.dim();
        let mut out = Array3::<f64>::zeros((n, p, 2));
        let mut order: Vec<usize> = (0..p).collect();

        for (i, row) in x.outer_iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
            let mut phi = Array1::<f64>::zeros(p);

            for _ in 0..self.permutations {
                order.shuffle(&mut rng);
                self.walk(row, &order, &mut phi)?;
                order.reverse();
                self.walk(row, &order, &mut phi)?;
            }
            phi /= (2 * self.permutations) as f64;

            out.slice_mut(s![i, .., 1]).assign(&phi);
            out.slice_mut(s![i, .., 0]).assign(&phi.mapv(|v| -v));
        }

        Ok(Attribution {
            values: RawAttribution::Array(out.into_dyn()),
            base_value: self.base_value,
        })
    }
}
