//! Client lookup handler

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::extract::AppPath;
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    #[serde(rename = "SK_ID_CURR")]
    pub id: i64,
    pub features: Map<String, Value>,
    pub profile: Map<String, Value>,
}

/// Get a client from the reference dataset
pub async fn get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> AppResult<Json<ClientResponse>> {
    let dataset = state.dataset()?;
    let record = dataset
        .client_record(id)
        .ok_or_else(|| AppError::NotFound(format!("Client {id} not found")))?;

    Ok(Json(ClientResponse {
        id: record.id,
        features: record.features,
        profile: record.profile,
    }))
}
