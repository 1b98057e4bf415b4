//! Error handling

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::dataset::DatasetError;
use crate::explain::ExplainError;
use crate::model::ModelError;
use crate::prediction_log::LogError;
use crate::schema;

pub type AppResult<T> = Result<T, AppError>;

/// One offending request field
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    // Resource errors
    #[error("{0}")]
    NotFound(String),

    // Request validation errors
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    // Configuration / reference data errors
    #[error("{0}")]
    Config(String),

    // Model load or inference errors
    #[error("{0}")]
    Model(String),

    // Attribution errors
    #[error("{0}")]
    Explain(String),

    // Generic errors
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn invalid_fields(details: Vec<FieldError>) -> Self {
        AppError::Validation {
            message: "request validation failed".to_string(),
            details,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Config(_)
            | AppError::Model(_)
            | AppError::Explain(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Config(msg) => tracing::error!("Configuration error: {}", msg),
            AppError::Model(msg) => tracing::error!("Model error: {}", msg),
            AppError::Explain(msg) => tracing::error!("Explanation error: {}", msg),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::Validation { message, .. } => {
                tracing::debug!("Rejected request: {}", message)
            }
            AppError::NotFound(_) => {}
        }

        let details = match &self {
            AppError::Validation { details, .. } => details.clone(),
            _ => Vec::new(),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "details": details,
        }));

        (status, body).into_response()
    }
}

impl From<DatasetError> for AppError {
    fn from(err: DatasetError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::Model(format!("prediction failed: {err}"))
    }
}

impl From<ExplainError> for AppError {
    fn from(err: ExplainError) -> Self {
        match err {
            ExplainError::Model(inner) => inner.into(),
            other => AppError::Explain(other.to_string()),
        }
    }
}

impl From<LogError> for AppError {
    fn from(err: LogError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("worker task failed: {err}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = schema::canonical_field_name(&field);
                errs.iter().map(move |e| FieldError {
                    field: field.clone(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} rule failed", e.code)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        AppError::invalid_fields(details)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}
