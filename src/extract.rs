//! Request extractors that reject with [`AppError`] instead of axum's
//! plain-text rejections

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

use crate::error::{AppError, FieldError};

/// `Query` with a structured 422 on failure
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// `Path` with a structured 422 on failure
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// A JSON request body that can report every bad field at once
pub trait Payload: DeserializeOwned + Validate {
    /// Absent or wrongly typed fields, checked on the raw body
    fn field_errors(body: &Value) -> Vec<FieldError>;
}

/// JSON body checked field by field, deserialized, then run through `validator`
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: Payload,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state).await?;

        let details = T::field_errors(&body);
        if !details.is_empty() {
            return Err(AppError::invalid_fields(details));
        }

        let value: T =
            serde_json::from_value(body).map_err(|e| AppError::validation(e.to_string()))?;
        value.validate()?;
        Ok(Self(value))
    }
}
