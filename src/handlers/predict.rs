//! Scoring handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::explain::{ContributionRow, GlobalImportanceRow};
use crate::extract::{AppQuery, ValidatedJson};
use crate::prediction_log::PredictionEvent;
use crate::schema::CustomerFeatures;
use crate::scoring::PredictionResponse;
use crate::{AppResult, AppState};

/// Score one client
pub async fn predict(
    State(state): State<AppState>,
    ValidatedJson(features): ValidatedJson<CustomerFeatures>,
) -> AppResult<Json<PredictionResponse>> {
    let model = state.model()?;
    let probability = model.predict_one(&features.to_vector())?;
    let response = PredictionResponse::new(&state.policy, probability);

    state
        .prediction_log
        .record(&PredictionEvent::now(
            features.to_feature_map(),
            probability,
            response.prediction,
        ))
        .await?;

    tracing::debug!(
        "Prediction: p={:.4} decision={} (threshold {})",
        probability,
        response.prediction,
        response.threshold_used
    );

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub top_n: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    #[serde(flatten)]
    pub prediction: PredictionResponse,
    pub base_value: f64,
    pub top_contributions: Vec<ContributionRow>,
    pub global_importance: Vec<GlobalImportanceRow>,
}

/// Score one client and explain the score
pub async fn explain(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ExplainParams>,
    ValidatedJson(features): ValidatedJson<CustomerFeatures>,
) -> AppResult<Json<ExplainResponse>> {
    let model = state.model()?.clone();
    let explainer = state.explainer()?.clone();
    let top_n = params.top_n.unwrap_or(state.config.local_top_n);
    let global_top_n = state.config.global_top_n;

    let vector = features.to_vector();
    let feature_map = features.to_feature_map();

    // Attribution is CPU-bound; the first call also fills the global cache
    let (probability, local, global) = tokio::task::spawn_blocking({
        let feature_map = feature_map.clone();
        move || -> AppResult<_> {
            let probability = model.predict_one(&vector)?;
            let local = explainer.explain_one(&vector, &feature_map, top_n)?;
            let global = explainer.global_importance(global_top_n)?;
            Ok((probability, local, global))
        }
    })
    .await??;

    let prediction = PredictionResponse::new(&state.policy, probability);
    state
        .prediction_log
        .record(&PredictionEvent::now(feature_map, probability, prediction.prediction))
        .await?;

    Ok(Json(ExplainResponse {
        prediction,
        base_value: local.base_value,
        top_contributions: local.contributions,
        global_importance: global,
    }))
}
