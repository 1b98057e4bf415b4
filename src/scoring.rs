//! Decision rule and business costs

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// Static decision policy returned with every prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub threshold: f64,
    /// Accepting a client who defaults
    pub cost_fn: u32,
    /// Refusing a client who would have repaid
    pub cost_fp: u32,
}

impl DecisionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.threshold,
            cost_fn: config.cost_fn,
            cost_fp: config.cost_fp,
        }
    }

    /// 1 (refuse) iff `probability >= threshold`
    pub fn decide(&self, probability: f64) -> u8 {
        u8::from(probability >= self.threshold)
    }

    pub fn business_cost(&self, actual: u8, predicted: u8) -> u32 {
        match (actual, predicted) {
            (1, 0) => self.cost_fn,
            (0, 1) => self.cost_fp,
            _ => 0,
        }
    }

    /// Expected cost of `decision` given the default probability
    pub fn expected_cost(&self, probability: f64, decision: u8) -> f64 {
        if decision == 1 {
            (1.0 - probability) * self.business_cost(0, 1) as f64
        } else {
            probability * self.business_cost(1, 0) as f64
        }
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Fields shared by `/predict` and `/explain`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub probability_default: f64,
    pub prediction: u8,
    pub threshold_used: f64,
    #[serde(rename = "business_cost_FN")]
    pub business_cost_fn: u32,
    #[serde(rename = "business_cost_FP")]
    pub business_cost_fp: u32,
}

impl PredictionResponse {
    pub fn new(policy: &DecisionPolicy, probability: f64) -> Self {
        Self {
            probability_default: probability,
            prediction: policy.decide(probability),
            threshold_used: policy.threshold,
            business_cost_fn: policy.cost_fn,
            business_cost_fp: policy.cost_fp,
        }
    }
}
