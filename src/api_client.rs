//! HTTP client for the scoring API, used by the case review tool

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::scoring::PredictionResponse;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} answered {status}: {message}")]
    Api {
        endpoint: String,
        status: StatusCode,
        message: String,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub threshold_used: f64,
    #[serde(rename = "business_cost_FN")]
    pub business_cost_fn: u32,
    #[serde(rename = "business_cost_FP")]
    pub business_cost_fp: u32,
    pub features: Vec<FeatureInfo>,
    pub id_field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRecord {
    #[serde(rename = "SK_ID_CURR")]
    pub id: i64,
    pub features: Map<String, Value>,
    pub profile: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: Value,
    pub shap_value: f64,
    pub direction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Importance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Explanation {
    #[serde(flatten)]
    pub prediction: PredictionResponse,
    pub base_value: f64,
    pub top_contributions: Vec<Contribution>,
    pub global_importance: Vec<Importance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopulationSample {
    pub n: usize,
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct HealthPayload {
    status: String,
}

/// Thin wrapper over the API routes
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// True when `/health` answers `ok`
    pub async fn health(&self) -> ClientResult<bool> {
        let response = self.client.get(self.endpoint("health")).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let payload = response.json::<HealthPayload>().await?;
        Ok(payload.status == "ok")
    }

    pub async fn metadata(&self) -> ClientResult<Metadata> {
        let response = self.client.get(self.endpoint("metadata")).send().await?;
        decode("metadata", response).await
    }

    /// `None` when the client id is unknown
    pub async fn get_client(&self, id: i64) -> ClientResult<Option<ClientRecord>> {
        let response = self
            .client
            .get(self.endpoint(&format!("client/{id}")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode("client", response).await.map(Some)
    }

    pub async fn predict(&self, features: &Map<String, Value>) -> ClientResult<PredictionResponse> {
        let response = self
            .client
            .post(self.endpoint("predict"))
            .json(features)
            .send()
            .await?;
        decode("predict", response).await
    }

    pub async fn explain(
        &self,
        features: &Map<String, Value>,
        top_n: usize,
    ) -> ClientResult<Explanation> {
        let response = self
            .client
            .post(self.endpoint("explain"))
            .query(&[("top_n", top_n)])
            .json(features)
            .send()
            .await?;
        decode("explain", response).await
    }

    pub async fn population_sample(&self, n: usize) -> ClientResult<PopulationSample> {
        let response = self
            .client
            .get(self.endpoint("population/sample"))
            .query(&[("n", n)])
            .send()
            .await?;
        decode("population/sample", response).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> ClientResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response
        .json::<Value>()
        .await
        .unwrap_or(Value::Null);
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    Err(ClientError::Api {
        endpoint: endpoint.to_string(),
        status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        let client = ApiClient::new("http://127.0.0.1:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint("/predict"), "http://127.0.0.1:8000/predict");
        assert_eq!(client.endpoint("population/sample"), "http://127.0.0.1:8000/population/sample");
    }

    #[test]
    fn test_explanation_decodes_flattened_prediction() {
        let body = serde_json::json!({
            "probability_default": 0.61,
            "prediction": 1,
            "threshold_used": 0.42,
            "business_cost_FN": 10000,
            "business_cost_FP": 500,
            "base_value": -1.2,
            "top_contributions": [
                {
                    "feature": "EXT_SOURCE_3",
                    "value": 0.1,
                    "shap_value": 0.8,
                    "direction": "increase_risk"
                }
            ],
            "global_importance": [{"feature": "EXT_SOURCE_3", "importance": 0.5}]
        });
        let explanation: Explanation = serde_json::from_value(body).unwrap();
        assert_eq!(explanation.prediction.prediction, 1);
        assert_eq!(explanation.top_contributions[0].feature, "EXT_SOURCE_3");
        assert_eq!(explanation.global_importance.len(), 1);
    }
}
