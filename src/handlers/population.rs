//! Population sample handler (comparison views)

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extract::AppQuery;
use crate::{AppResult, AppState};

const DEFAULT_SAMPLE_SIZE: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct SampleParams {
    pub n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PopulationSample {
    pub n: usize,
    pub rows: Vec<Map<String, Value>>,
}

/// Seeded sample of reference clients, `n` clamped to `[1, POPULATION_SAMPLE_MAX]`
pub async fn sample(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<SampleParams>,
) -> AppResult<Json<PopulationSample>> {
    let dataset = state.dataset()?;
    let n = params
        .n
        .unwrap_or(DEFAULT_SAMPLE_SIZE)
        .clamp(1, state.config.population_sample_max.max(1));

    let rows = dataset.population_rows(n, state.config.random_seed);
    Ok(Json(PopulationSample { n: rows.len(), rows }))
}
