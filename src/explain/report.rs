//! Ranked local contributions and global importance

use ndarray::{ArrayView2, Axis};
use serde::Serialize;
use serde_json::{Map, Value};

use super::ExplainError;
use crate::schema::{FEATURES, FEATURE_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    IncreaseRisk,
    DecreaseRisk,
}

impl Direction {
    pub fn of(attribution: f64) -> Self {
        if attribution > 0.0 {
            Direction::IncreaseRisk
        } else {
            Direction::DecreaseRisk
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContributionRow {
    pub feature: &'static str,
    /// Client's raw value, `null` when missing
    pub value: Value,
    #[serde(rename = "shap_value")]
    pub attribution: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalImportanceRow {
    pub feature: &'static str,
    pub importance: f64,
}

fn check_len(found: usize) -> Result<(), ExplainError> {
    if found != FEATURE_COUNT {
        return Err(ExplainError::LengthMismatch {
            expected: FEATURE_COUNT,
            found,
        });
    }
    Ok(())
}

/// Top `top_n` rows by descending |attribution|; ties keep canonical order.
pub fn top_contributions(
    feature_values: &Map<String, Value>,
    attributions: &[f64],
    top_n: usize,
) -> Result<Vec<ContributionRow>, ExplainError> {
    check_len(attributions.len())?;

    let mut rows: Vec<ContributionRow> = FEATURES
        .iter()
        .zip(attributions)
        .map(|(spec, &attribution)| ContributionRow {
            feature: spec.name,
            value: feature_values.get(spec.name).cloned().unwrap_or(Value::Null),
            attribution,
            direction: Direction::of(attribution),
        })
        .collect();

    // sort_by is stable
    rows.sort_by(|a, b| b.attribution.abs().total_cmp(&a.attribution.abs()));
    rows.truncate(top_n);
    Ok(rows)
}

/// Mean |attribution| per feature over an `(n, p)` matrix, descending
pub fn global_importance(
    matrix: ArrayView2<f64>,
) -> Result<Vec<GlobalImportanceRow>, ExplainError> {
    check_len(matrix.ncols())?;
    let mean_abs = matrix
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .ok_or(ExplainError::EmptyBackground)?;

    let mut rows: Vec<GlobalImportanceRow> = FEATURES
        .iter()
        .zip(mean_abs.iter())
        .map(|(spec, &importance)| GlobalImportanceRow {
            feature: spec.name,
            importance,
        })
        .collect();
    rows.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use serde_json::json;

    fn values() -> Map<String, Value> {
        crate::schema::feature_map(&[
            0.45, 0.62, 0.75, 1.0, -500.0, -300.5, 2.0, 2.0, -2000.0, -12000.0,
        ])
    }

    #[test]
    fn test_rows_sorted_by_magnitude() {
        let attributions = [0.1, -0.5, 0.3, 0.0, -0.05, 0.2, -0.3, 0.01, 0.4, -0.02];
        let rows = top_contributions(&values(), &attributions, 10).unwrap();
        assert_eq!(rows.len(), 10);
        assert!(rows.windows(2).all(|w| w[0].attribution.abs() >= w[1].attribution.abs()));
        assert_eq!(rows[0].feature, "EXT_SOURCE_2");
        assert_eq!(rows[0].direction, Direction::DecreaseRisk);
        assert_eq!(rows[1].feature, "DAYS_EMPLOYED");
        // |0.3| tie: EXT_SOURCE_1 precedes REGION_RATING_CLIENT in canonical order
        assert_eq!(rows[2].feature, "EXT_SOURCE_1");
        assert_eq!(rows[3].feature, "REGION_RATING_CLIENT");
        assert_eq!(rows[0].value, json!(0.62));
        assert_eq!(rows[1].value, json!(-2000.0));
    }

    #[test]
    fn test_top_n_truncates() {
        let attributions = [1.0; FEATURE_COUNT];
        assert_eq!(top_contributions(&values(), &attributions, 3).unwrap().len(), 3);
        assert_eq!(top_contributions(&values(), &attributions, 50).unwrap().len(), FEATURE_COUNT);
        assert!(top_contributions(&values(), &attributions, 0).unwrap().is_empty());
    }

    #[test]
    fn test_direction_label() {
        assert_eq!(Direction::of(0.001), Direction::IncreaseRisk);
        assert_eq!(Direction::of(0.0), Direction::DecreaseRisk);
        assert_eq!(Direction::of(-1.0), Direction::DecreaseRisk);
        assert_eq!(serde_json::to_value(Direction::IncreaseRisk).unwrap(), json!("increase_risk"));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            top_contributions(&values(), &[0.1, 0.2], 10),
            Err(ExplainError::LengthMismatch { expected: 10, found: 2 })
        ));
    }

    #[test]
    fn test_global_importance_mean_abs() {
        let mut m = Array2::<f64>::zeros((2, FEATURE_COUNT));
        m[[0, 9]] = -4.0;
        m[[1, 9]] = 2.0;
        m[[0, 0]] = 1.0;
        let rows = global_importance(m.view()).unwrap();
        assert_eq!(rows.len(), FEATURE_COUNT);
        assert_eq!(rows[0].feature, "DAYS_BIRTH");
        assert_eq!(rows[0].importance, 3.0);
        assert_eq!(rows[1].feature, "EXT_SOURCE_3");
        assert_eq!(rows[1].importance, 0.5);
    }
}
