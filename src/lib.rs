//! Credit Risk API
//!
//! Serves a pre-trained default-probability classifier over HTTP and explains
//! each score with per-feature attributions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       CREDIT RISK API                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌────────────────────────┐ │
//! │  │  Router   │  │  Model       │  │  Explainer             │ │
//! │  │  (Axum)   │  │  (registry / │  │  (engine + shape       │ │
//! │  │           │  │  file / stub)│  │  normalizer + report)  │ │
//! │  └─────┬─────┘  └──────┬───────┘  └───────────┬────────────┘ │
//! │        └───────────────┼──────────────────────┘              │
//! │                        ▼                                     │
//! │        ┌────────────────────────────────┐                    │
//! │        │ Reference CSV │ Prediction log │                    │
//! │        └────────────────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod api_client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod explain;
pub mod extract;
pub mod handlers;
pub mod model;
pub mod prediction_log;
pub mod review;
pub mod schema;
pub mod scoring;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};
pub use state::AppState;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/metadata", get(handlers::metadata::get))
        .route("/client/:id", get(handlers::client::get))
        .route("/predict", post(handlers::predict::predict))
        .route("/explain", post(handlers::predict::explain))
        .route("/population/sample", get(handlers::population::sample))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
