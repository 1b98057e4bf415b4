//! Model loader chain: registry -> local file -> stub

use std::path::PathBuf;
use std::time::Duration;

use super::{LoadedModel, ModelArtifact, ModelError};
use crate::config::Config;

/// One way of obtaining a model artifact
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// Remote registry serving the artifact as JSON over HTTP
    Registry { url: String, timeout: Duration },
    /// Artifact file on disk
    LocalFile(PathBuf),
    /// Built-in fallback model
    Stub { enabled: bool },
}

impl ModelSource {
    pub fn describe(&self) -> String {
        match self {
            ModelSource::Registry { url, .. } => format!("registry {url}"),
            ModelSource::LocalFile(path) => format!("file {}", path.display()),
            ModelSource::Stub { .. } => "stub".to_string(),
        }
    }

    pub async fn fetch(&self) -> Result<ModelArtifact, ModelError> {
        match self {
            ModelSource::Registry { url, timeout } => {
                let client = reqwest::Client::builder().timeout(*timeout).build()?;
                let artifact = client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<ModelArtifact>()
                    .await?;
                Ok(artifact)
            }
            ModelSource::LocalFile(path) => {
                let raw = tokio::fs::read(path).await?;
                Ok(serde_json::from_slice(&raw)?)
            }
            ModelSource::Stub { enabled: true } => Ok(ModelArtifact::stub()),
            ModelSource::Stub { enabled: false } => Err(ModelError::Disabled),
        }
    }
}

/// Ordered list of sources, tried until one yields a valid model
#[derive(Debug, Clone)]
pub struct ModelLoader {
    sources: Vec<ModelSource>,
}

impl ModelLoader {
    pub fn new(sources: Vec<ModelSource>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut sources = Vec::new();
        if let Some(url) = &config.model_registry_url {
            sources.push(ModelSource::Registry {
                url: url.clone(),
                timeout: Duration::from_secs(config.model_registry_timeout_secs),
            });
        }
        sources.push(ModelSource::LocalFile(config.model_path.clone()));
        sources.push(ModelSource::Stub {
            enabled: config.allow_stub_model,
        });
        Self::new(sources)
    }

    pub fn sources(&self) -> &[ModelSource] {
        &self.sources
    }

    pub async fn load(&self) -> Result<LoadedModel, ModelError> {
        let mut failures = Vec::new();

        for source in &self.sources {
            let name = source.describe();
            let loaded = match source.fetch().await {
                Ok(artifact) => LoadedModel::from_artifact(artifact, &name),
                Err(e) => Err(e),
            };
            match loaded {
                Ok(model) => {
                    let info = model.info();
                    tracing::info!("Model {} v{} loaded from {}", info.name, info.version, name);
                    return Ok(model);
                }
                Err(e) => {
                    tracing::warn!("Model source {} failed: {}", name, e);
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        Err(ModelError::Exhausted(failures))
    }
}
