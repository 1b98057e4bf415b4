//! Shared application state, built once at startup

use std::sync::Arc;

use crate::config::Config;
use crate::dataset::ReferenceDataset;
use crate::error::{AppError, AppResult};
use crate::explain::{engine_for, Explainer};
use crate::model::{LoadedModel, ModelLoader};
use crate::prediction_log::PredictionLog;
use crate::scoring::DecisionPolicy;

/// A startup dependency that either loaded or failed for good.
/// Failures are kept so every dependent request reports the cause.
#[derive(Debug)]
pub enum Component<T> {
    Ready(Arc<T>),
    Failed(String),
}

impl<T> Component<T> {
    pub fn get(&self) -> Option<&Arc<T>> {
        match self {
            Component::Ready(value) => Some(value),
            Component::Failed(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Component::Ready(_))
    }
}

impl<T> Clone for Component<T> {
    fn clone(&self) -> Self {
        match self {
            Component::Ready(value) => Component::Ready(Arc::clone(value)),
            Component::Failed(msg) => Component::Failed(msg.clone()),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy: DecisionPolicy,
    pub dataset: Component<ReferenceDataset>,
    pub model: Component<LoadedModel>,
    pub explainer: Component<Explainer>,
    pub prediction_log: Arc<PredictionLog>,
}

impl AppState {
    /// Loads the reference dataset and the model, then builds the explainer
    /// on top of both. Failures are logged and kept, not fatal.
    pub async fn load(config: Config) -> Self {
        let loaded =
            ReferenceDataset::from_path(&config.reference_data_path, &config.profile_columns);
        let dataset = match loaded {
            Ok(dataset) => Component::Ready(Arc::new(dataset)),
            Err(e) => {
                tracing::error!("Reference dataset unavailable: {}", e);
                Component::Failed(e.to_string())
            }
        };

        let model = match ModelLoader::from_config(&config).load().await {
            Ok(model) => Component::Ready(Arc::new(model)),
            Err(e) => {
                tracing::error!("Model load failed: {}", e);
                Component::Failed(e.to_string())
            }
        };

        Self::assemble(config, dataset, model)
    }

    /// Builds the state from already loaded parts
    pub fn assemble(
        config: Config,
        dataset: Component<ReferenceDataset>,
        model: Component<LoadedModel>,
    ) -> Self {
        let explainer = match (&dataset, &model) {
            (Component::Ready(dataset), Component::Ready(model)) => {
                let background = dataset.background(config.background_size, config.random_seed);
                let built = engine_for(model.clone(), background.view(), &config)
                    .and_then(|engine| Explainer::new(engine, background));
                match built {
                    Ok(explainer) => {
                        tracing::info!(
                            "Explainer ready: {} engine, {} background rows",
                            explainer.engine_name(),
                            explainer.background_size()
                        );
                        Component::Ready(Arc::new(explainer))
                    }
                    Err(e) => {
                        tracing::error!("Explainer unavailable: {}", e);
                        Component::Failed(e.to_string())
                    }
                }
            }
            (Component::Failed(e), _) => {
                Component::Failed(format!("reference dataset unavailable: {e}"))
            }
            (_, Component::Failed(e)) => Component::Failed(format!("model unavailable: {e}")),
        };

        Self {
            policy: DecisionPolicy::from_config(&config),
            prediction_log: Arc::new(PredictionLog::new(config.prediction_log_path.clone())),
            config: Arc::new(config),
            dataset,
            model,
            explainer,
        }
    }

    pub fn dataset(&self) -> AppResult<&Arc<ReferenceDataset>> {
        match &self.dataset {
            Component::Ready(dataset) => Ok(dataset),
            Component::Failed(e) => Err(AppError::Config(format!(
                "reference dataset unavailable: {e}"
            ))),
        }
    }

    pub fn model(&self) -> AppResult<&Arc<LoadedModel>> {
        match &self.model {
            Component::Ready(model) => Ok(model),
            Component::Failed(e) => Err(AppError::Model(format!("model unavailable: {e}"))),
        }
    }

    pub fn explainer(&self) -> AppResult<&Arc<Explainer>> {
        match &self.explainer {
            Component::Ready(explainer) => Ok(explainer),
            Component::Failed(e) => Err(AppError::Explain(format!("explainer unavailable: {e}"))),
        }
    }
}
