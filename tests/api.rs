//! End-to-end tests of the HTTP contract

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use credit_risk_api::{
    config::Config,
    create_router,
    dataset::ReferenceDataset,
    model::{LoadedModel, ModelArtifact},
    state::Component,
    AppState,
};

const CSV: &str = "\
SK_ID_CURR,EXT_SOURCE_1,EXT_SOURCE_2,EXT_SOURCE_3,REG_CITY_NOT_WORK_CITY,DAYS_ID_PUBLISH,DAYS_LAST_PHONE_CHANGE,REGION_RATING_CLIENT,REGION_RATING_CLIENT_W_CITY,DAYS_EMPLOYED,DAYS_BIRTH,CODE_GENDER,AMT_INCOME_TOTAL
100002,0.083,0.263,0.139,0,-2120,-1134.0,2,2,-637.0,-9461,M,202500.0
100003,0.311,0.622,,0,-291,-828.0,1,1,-1188.0,-16765,F,270000.0
100004,,0.556,0.730,0,-2531,-815.0,2,2,-225.0,-19046,M,67500.0
100006,,0.650,,0,-2437,-617.0,2,2,-3039.0,-19005,F,135000.0
100007,,0.323,,1,-3458,-1106.0,2,2,-3038.0,-19932,M,121500.0
100008,,0.354,0.621,0,-477,-2536.0,2,2,-1588.0,-16941,M,99000.0
100009,0.774,0.724,0.492,0,-619,-1562.0,2,2,-3130.0,-13778,F,171000.0
100010,,0.714,0.540,1,-2379,-1070.0,3,3,-449.0,-18850,M,360000.0
";

struct TestApp {
    state: AppState,
    _log_dir: TempDir,
}

impl TestApp {
    fn log_path(&self) -> std::path::PathBuf {
        self.state.config.prediction_log_path.clone()
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = create_router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }
}

fn test_config(log_dir: &TempDir) -> Config {
    Config {
        prediction_log_path: log_dir.path().join("logs/predictions.jsonl"),
        profile_columns: vec!["CODE_GENDER".into(), "AMT_INCOME_TOTAL".into()],
        background_size: 50,
        ..Config::default()
    }
}

fn dataset(config: &Config) -> Component<ReferenceDataset> {
    let dataset = ReferenceDataset::from_reader(CSV.as_bytes(), &config.profile_columns).unwrap();
    Component::Ready(Arc::new(dataset))
}

fn app_with(artifact: ModelArtifact) -> TestApp {
    let log_dir = TempDir::new().unwrap();
    let config = test_config(&log_dir);
    let model = LoadedModel::from_artifact(artifact, "test").unwrap();
    let dataset = dataset(&config);
    TestApp {
        state: AppState::assemble(config, dataset, Component::Ready(Arc::new(model))),
        _log_dir: log_dir,
    }
}

fn app() -> TestApp {
    app_with(ModelArtifact::stub())
}

fn payload() -> Value {
    json!({
        "EXT_SOURCE_3": 0.155,
        "EXT_SOURCE_2": 0.262,
        "EXT_SOURCE_1": 0.083,
        "REG_CITY_NOT_WORK_CITY": 0,
        "DAYS_ID_PUBLISH": -2120,
        "DAYS_LAST_PHONE_CHANGE": -1134.0,
        "REGION_RATING_CLIENT": 2,
        "REGION_RATING_CLIENT_W_CITY": 2,
        "DAYS_EMPLOYED": -637.0,
        "DAYS_BIRTH": -9461
    })
}

fn detail_fields(body: &Value) -> Vec<&str> {
    body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = app().get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_metadata_describes_policy_and_features() {
    let (status, body) = app().get("/metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["threshold_used"], 0.42);
    assert_eq!(body["business_cost_FN"], 10000);
    assert_eq!(body["business_cost_FP"], 500);
    assert_eq!(body["id_field"], "SK_ID_CURR");

    let features = body["features"].as_array().unwrap();
    assert_eq!(features.len(), 10);
    assert_eq!(features[0]["name"], "EXT_SOURCE_3");
    assert_eq!(features[0]["type"], "float");
    assert_eq!(features[9]["name"], "DAYS_BIRTH");
    assert_eq!(features[9]["type"], "int");
    assert_eq!(body["model"]["name"], "stub-logistic");
}

#[tokio::test]
async fn test_client_lookup() {
    let app = app();

    let (status, body) = app.get("/client/100002").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["SK_ID_CURR"], 100002);
    assert_eq!(body["profile"]["SK_ID_CURR"], 100002);
    assert_eq!(body["profile"]["CODE_GENDER"], "M");
    assert_eq!(body["features"]["DAYS_BIRTH"], -9461);
    assert_eq!(body["features"].as_object().unwrap().len(), 10);

    let (_, body) = app.get("/client/100003").await;
    assert_eq!(body["features"]["EXT_SOURCE_3"], Value::Null);
}

#[tokio::test]
async fn test_client_not_found() {
    let app = app();

    let (status, body) = app.get("/client/999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("999999"));

    let (status, _) = app.get("/client/abc").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_predict_applies_threshold_and_logs() {
    let app = app();

    let (status, body) = app.post("/predict", payload()).await;
    assert_eq!(status, StatusCode::OK);

    let probability = body["probability_default"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!(body["threshold_used"], 0.42);
    assert_eq!(body["business_cost_FN"], 10000);
    assert_eq!(body["business_cost_FP"], 500);
    let expected = if probability >= 0.42 { 1 } else { 0 };
    assert_eq!(body["prediction"], expected);

    let log = std::fs::read_to_string(app.log_path()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let event: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["probability"], body["probability_default"]);
    assert_eq!(event["prediction"], body["prediction"]);
    assert_eq!(event["features"]["DAYS_BIRTH"], -9461);
    assert!(event["timestamp"].is_string());
}

#[tokio::test]
async fn test_predict_accepts_null_values() {
    let mut body = payload();
    body["EXT_SOURCE_1"] = Value::Null;
    body["DAYS_EMPLOYED"] = Value::Null;

    let (status, response) = app().post("/predict", body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response["probability_default"].as_f64().is_some());
}

#[tokio::test]
async fn test_predict_rejects_incomplete_payload() {
    let app = app();

    let (status, body) = app.post("/predict", json!({"DAYS_BIRTH": -15000})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], 422);
    let fields = detail_fields(&body);
    assert_eq!(fields.len(), 9);
    assert!(!fields.contains(&"DAYS_BIRTH"));

    let (status, body) = app.post("/predict", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        detail_fields(&body),
        vec![
            "EXT_SOURCE_3",
            "EXT_SOURCE_2",
            "EXT_SOURCE_1",
            "REG_CITY_NOT_WORK_CITY",
            "DAYS_ID_PUBLISH",
            "DAYS_LAST_PHONE_CHANGE",
            "REGION_RATING_CLIENT",
            "REGION_RATING_CLIENT_W_CITY",
            "DAYS_EMPLOYED",
            "DAYS_BIRTH",
        ]
    );
    assert!(body["details"]
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["message"] == "field required"));

    let (status, body) = app.post("/predict", json!({"foo": 1})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(detail_fields(&body).len(), 10);

    // nothing is logged for rejected requests
    assert!(!app.log_path().exists());
}

#[tokio::test]
async fn test_predict_accepts_integral_floats_for_int_features() {
    let app = app();
    let (_, expected) = app.post("/predict", payload()).await;

    let mut body = payload();
    body["DAYS_BIRTH"] = json!(-9461.0);
    body["REGION_RATING_CLIENT"] = json!(2.0);
    let (status, response) = app.post("/predict", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["probability_default"], expected["probability_default"]);
}

#[tokio::test]
async fn test_client_features_round_trip_through_explain() {
    let app = app();
    let (_, client) = app.get("/client/100003").await;

    let (status, body) = app.post("/explain?top_n=3", client["features"].clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_contributions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_predict_rejects_out_of_range_values() {
    let mut body = payload();
    body["EXT_SOURCE_3"] = json!(1.5);
    body["REGION_RATING_CLIENT"] = json!(7);

    let (status, response) = app().post("/predict", body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(detail_fields(&response), vec!["EXT_SOURCE_3", "REGION_RATING_CLIENT"]);
}

#[tokio::test]
async fn test_predict_rejects_wrong_types() {
    let mut body = payload();
    body["DAYS_BIRTH"] = json!("young");
    body["EXT_SOURCE_2"] = json!([0.5]);
    body["REGION_RATING_CLIENT"] = json!(2.5);

    let (status, response) = app().post("/predict", body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        detail_fields(&response),
        vec!["EXT_SOURCE_2", "REGION_RATING_CLIENT", "DAYS_BIRTH"]
    );
    assert_eq!(response["details"][0]["message"], "expected a number");
    assert_eq!(response["details"][1]["message"], "expected an integer");
}

#[tokio::test]
async fn test_explain_ranks_contributions() {
    let app = app();

    let (status, body) = app.post("/explain?top_n=3", payload()).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body["top_contributions"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let magnitudes: Vec<f64> = rows
        .iter()
        .map(|r| r["shap_value"].as_f64().unwrap().abs())
        .collect();
    assert!(magnitudes.windows(2).all(|w| w[0] >= w[1]));
    for row in rows {
        let expected = if row["shap_value"].as_f64().unwrap() > 0.0 {
            "increase_risk"
        } else {
            "decrease_risk"
        };
        assert_eq!(row["direction"], expected);
        let feature = row["feature"].as_str().unwrap();
        assert_eq!(row["value"], payload()[feature]);
    }

    let global = body["global_importance"].as_array().unwrap();
    assert_eq!(global.len(), 10);
    let importances: Vec<f64> = global
        .iter()
        .map(|r| r["importance"].as_f64().unwrap())
        .collect();
    assert!(importances.windows(2).all(|w| w[0] >= w[1]));
    assert!(importances.iter().all(|v| *v >= 0.0));

    assert_eq!(body["threshold_used"], 0.42);
    assert!(body["probability_default"].as_f64().is_some());
    assert!(body["base_value"].as_f64().is_some());
}

#[tokio::test]
async fn test_explain_contributions_add_up_to_log_odds() {
    let (status, body) = app().post("/explain?top_n=10", payload()).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body["top_contributions"].as_array().unwrap();
    assert_eq!(rows.len(), 10);
    let total: f64 = body["base_value"].as_f64().unwrap()
        + rows.iter().map(|r| r["shap_value"].as_f64().unwrap()).sum::<f64>();
    let p = body["probability_default"].as_f64().unwrap();
    assert!((total - (p / (1.0 - p)).ln()).abs() < 1e-9);
}

#[tokio::test]
async fn test_explain_top_n_is_capped_at_feature_count() {
    let app = app();

    let (_, body) = app.post("/explain?top_n=50", payload()).await;
    assert_eq!(body["top_contributions"].as_array().unwrap().len(), 10);

    let (_, body) = app.post("/explain", payload()).await;
    assert_eq!(body["top_contributions"].as_array().unwrap().len(), 10);

    let (status, _) = app.post("/explain?top_n=-1", payload()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_global_importance_is_stable_across_calls() {
    let app = app();

    let (_, first) = app.post("/explain?top_n=1", payload()).await;
    let mut other = payload();
    other["EXT_SOURCE_3"] = json!(0.9);
    let (_, second) = app.post("/explain?top_n=1", other).await;

    assert_eq!(first["global_importance"], second["global_importance"]);
}

#[tokio::test]
async fn test_explain_with_tree_ensemble() {
    let artifact: ModelArtifact =
        serde_json::from_str(include_str!("../model/model.json")).unwrap();
    let app = app_with(artifact);

    let (status, body) = app.post("/explain?top_n=5", payload()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_contributions"].as_array().unwrap().len(), 5);
    assert_eq!(body["global_importance"].as_array().unwrap().len(), 10);

    // deterministic for a fixed seed
    let (_, again) = app.post("/explain?top_n=5", payload()).await;
    assert_eq!(body["top_contributions"], again["top_contributions"]);
}

#[tokio::test]
async fn test_population_sample_is_clamped() {
    let app = app();

    let (status, body) = app.get("/population/sample?n=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n"], 3);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["SK_ID_CURR"].is_i64() && r.as_object().unwrap().len() == 11));

    let (_, body) = app.get("/population/sample?n=0").await;
    assert_eq!(body["n"], 1);

    let (_, body) = app.get("/population/sample").await;
    assert_eq!(body["n"], 8);
}

#[tokio::test]
async fn test_failed_model_answers_500() {
    let log_dir = TempDir::new().unwrap();
    let config = test_config(&log_dir);
    let dataset = dataset(&config);
    let app = TestApp {
        state: AppState::assemble(
            config,
            dataset,
            Component::Failed("all model sources failed".into()),
        ),
        _log_dir: log_dir,
    };

    let (status, body) = app.post("/predict", payload()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("all model sources failed"));

    let (status, _) = app.post("/explain", payload()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = app.get("/metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("model").is_none());

    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/client/100002").await;
    assert_eq!(status, StatusCode::OK);
}
