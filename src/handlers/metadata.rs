//! Metadata handler - decision policy and feature schema for clients

use axum::{extract::State, Json};
use serde::Serialize;

use crate::model::ModelInfo;
use crate::schema::{FeatureSpec, CLIENT_ID_FIELD, FEATURES};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub threshold_used: f64,
    #[serde(rename = "business_cost_FN")]
    pub business_cost_fn: u32,
    #[serde(rename = "business_cost_FP")]
    pub business_cost_fp: u32,
    pub features: &'static [FeatureSpec],
    pub id_field: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
}

pub async fn get(State(state): State<AppState>) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        threshold_used: state.policy.threshold,
        business_cost_fn: state.policy.cost_fn,
        business_cost_fp: state.policy.cost_fp,
        features: &FEATURES,
        id_field: CLIENT_ID_FIELD,
        model: state.model.get().map(|m| m.info().clone()),
    })
}
