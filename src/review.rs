//! Case review: decision synthesis and client vs population comparison

use std::fmt::{self, Write as _};

use serde_json::{Map, Value};

use crate::api_client::{ClientRecord, Explanation, Metadata, PopulationSample};
use crate::scoring::{DecisionPolicy, PredictionResponse};

pub fn fmt_pct(x: f64) -> String {
    format!("{:.2}%", x * 100.0)
}

pub fn risk_label(prediction: u8) -> &'static str {
    if prediction == 1 {
        "High risk (refuse)"
    } else {
        "Low risk (accept)"
    }
}

/// Signed gap to the threshold, positive above it
pub fn distance_to_threshold(probability: f64, threshold: f64) -> f64 {
    probability - threshold
}

/// Decision summary for one scored client
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub probability: f64,
    pub threshold: f64,
    pub decision: u8,
    pub distance: f64,
    pub expected_cost: f64,
}

impl Synthesis {
    pub fn from_prediction(prediction: &PredictionResponse) -> Self {
        let policy = DecisionPolicy {
            threshold: prediction.threshold_used,
            cost_fn: prediction.business_cost_fn,
            cost_fp: prediction.business_cost_fp,
        };
        let probability = prediction.probability_default;
        Self {
            probability,
            threshold: prediction.threshold_used,
            decision: prediction.prediction,
            distance: distance_to_threshold(probability, prediction.threshold_used),
            expected_cost: policy.expected_cost(probability, prediction.prediction),
        }
    }

    pub fn label(&self) -> &'static str {
        risk_label(self.decision)
    }
}

impl fmt::Display for Synthesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Default probability: {}", fmt_pct(self.probability))?;
        writeln!(f, "Threshold:           {}", fmt_pct(self.threshold))?;
        writeln!(f, "Decision:            {}", self.label())?;
        if self.distance >= 0.0 {
            writeln!(f, "{} above threshold, application refused", fmt_pct(self.distance))?;
        } else {
            writeln!(f, "{} below threshold, application accepted", fmt_pct(self.distance.abs()))?;
        }
        write!(f, "Expected cost of this decision: {:.0}", self.expected_cost)
    }
}

/// Numeric values of one column, skipping nulls and non-numbers
pub fn numeric_column(rows: &[Map<String, Value>], feature: &str) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(feature).and_then(Value::as_f64))
        .filter(|v| v.is_finite())
        .collect()
}

/// Linear-interpolated quantile, `q` in `[0, 1]`. `sorted` must be ascending and non-empty.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Share of `values` strictly below `x`, in percent
pub fn percentile_of(values: &[f64], x: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let below = values.iter().filter(|v| **v < x).count();
    Some(below as f64 / values.len() as f64 * 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

pub fn quartiles(values: &[f64]) -> Option<Quartiles> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(Quartiles {
        q1: quantile_sorted(&sorted, 0.25),
        median: quantile_sorted(&sorted, 0.5),
        q3: quantile_sorted(&sorted, 0.75),
    })
}

/// Where the client sits in the population for one feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureComparison {
    pub feature: String,
    pub client_value: Option<f64>,
    pub quartiles: Quartiles,
    pub percentile: Option<f64>,
    pub population_size: usize,
}

/// `None` when the population has no numeric value for `feature`
pub fn compare_feature(
    feature: &str,
    client_value: Option<&Value>,
    population: &[Map<String, Value>],
) -> Option<FeatureComparison> {
    let values = numeric_column(population, feature);
    let quartiles = quartiles(&values)?;
    let client_value = client_value.and_then(Value::as_f64);

    Some(FeatureComparison {
        feature: feature.to_string(),
        client_value,
        percentile: client_value.and_then(|x| percentile_of(&values, x)),
        population_size: values.len(),
        quartiles,
    })
}

/// Client against the population on two features at once
#[derive(Debug, Clone, PartialEq)]
pub struct PairComparison {
    pub x: FeatureComparison,
    pub y: FeatureComparison,
    /// Rows numeric on both features
    pub joint_size: usize,
    /// Percent of those rows at or below the client on both features,
    /// `None` when either client value is missing
    pub quadrant_share: Option<f64>,
}

/// `None` when either feature has no numeric population data
pub fn compare_pair(
    x_feature: &str,
    y_feature: &str,
    client_features: &Map<String, Value>,
    population: &[Map<String, Value>],
) -> Option<PairComparison> {
    let x = compare_feature(x_feature, client_features.get(x_feature), population)?;
    let y = compare_feature(y_feature, client_features.get(y_feature), population)?;

    let joint: Vec<(f64, f64)> = population
        .iter()
        .filter_map(|row| {
            let a = row.get(x_feature).and_then(Value::as_f64)?;
            let b = row.get(y_feature).and_then(Value::as_f64)?;
            (a.is_finite() && b.is_finite()).then_some((a, b))
        })
        .collect();

    let quadrant_share = match (x.client_value, y.client_value) {
        (Some(cx), Some(cy)) if !joint.is_empty() => {
            let inside = joint.iter().filter(|(a, b)| *a <= cx && *b <= cy).count();
            Some(inside as f64 / joint.len() as f64 * 100.0)
        }
        _ => None,
    };

    Some(PairComparison {
        x,
        y,
        joint_size: joint.len(),
        quadrant_share,
    })
}

/// Requested names that are not model features
pub fn unknown_features<'a>(requested: &[&'a str], metadata: &Metadata) -> Vec<&'a str> {
    requested
        .iter()
        .copied()
        .filter(|name| !metadata.features.iter().any(|f| f.name == *name))
        .collect()
}

fn write_comparison(out: &mut String, cmp: &FeatureComparison) -> fmt::Result {
    let position = match (cmp.client_value, cmp.percentile) {
        (Some(x), Some(p)) => format!("client {x:.3}, {p:.1}th percentile"),
        _ => "client value missing".to_string(),
    };
    writeln!(
        out,
        "  {:<28} Q1 {:.3}  median {:.3}  Q3 {:.3}  {}",
        cmp.feature, cmp.quartiles.q1, cmp.quartiles.median, cmp.quartiles.q3, position
    )
}

/// One feature against the population
pub fn render_comparison(cmp: &FeatureComparison) -> String {
    let mut out = String::new();
    let _ = write_comparison(&mut out, cmp);
    out
}

/// Two features against the population
pub fn render_pair(pair: &PairComparison) -> String {
    let mut out = String::new();
    let _ = write_pair(&mut out, pair);
    out
}

fn write_pair(out: &mut String, pair: &PairComparison) -> fmt::Result {
    writeln!(
        out,
        "== {} x {} ({} clients with both values) ==",
        pair.x.feature, pair.y.feature, pair.joint_size
    )?;
    write_comparison(out, &pair.x)?;
    write_comparison(out, &pair.y)?;
    match pair.quadrant_share {
        Some(share) => writeln!(
            out,
            "  {share:.1}% of clients are at or below the client on both features"
        ),
        None => writeln!(out, "  client point unavailable (missing value)"),
    }
}

fn fmt_value(value: &Value) -> String {
    match value {
        Value::Null => "missing".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(x) if n.is_f64() => format!("{x:.3}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Full plain-text case report
pub fn render_report(
    record: &ClientRecord,
    explanation: &Explanation,
    population: &PopulationSample,
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, record, explanation, population);
    out
}

fn write_report(
    out: &mut String,
    record: &ClientRecord,
    explanation: &Explanation,
    population: &PopulationSample,
) -> fmt::Result {
    writeln!(out, "Client {}", record.id)?;
    writeln!(out)?;

    writeln!(out, "== Profile ==")?;
    for (field, value) in &record.profile {
        writeln!(out, "  {:<28} {}", field, fmt_value(value))?;
    }
    writeln!(out)?;

    writeln!(out, "== Decision ==")?;
    writeln!(out, "{}", Synthesis::from_prediction(&explanation.prediction))?;
    writeln!(out)?;

    writeln!(out, "== Local contributions (base value {:.4}) ==", explanation.base_value)?;
    for row in &explanation.top_contributions {
        writeln!(
            out,
            "  {:<28} {:>12} {:>+10.4}  {}",
            row.feature,
            fmt_value(&row.value),
            row.shap_value,
            row.direction
        )?;
    }
    writeln!(out)?;

    writeln!(out, "== Global importance ==")?;
    for row in &explanation.global_importance {
        writeln!(out, "  {:<28} {:.4}", row.feature, row.importance)?;
    }
    writeln!(out)?;

    writeln!(out, "== Client vs population ({} clients) ==", population.rows.len())?;
    for row in &explanation.top_contributions {
        let client_value = record.features.get(&row.feature);
        match compare_feature(&row.feature, client_value, &population.rows) {
            Some(cmp) => write_comparison(out, &cmp)?,
            None => writeln!(out, "  {:<28} no numeric population data", row.feature)?,
        }
    }

    Ok(())
}
