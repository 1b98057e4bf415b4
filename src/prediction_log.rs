//! Append-only prediction log (one JSON object per line)

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("prediction log write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("prediction event not serializable: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub timestamp: DateTime<Utc>,
    pub features: Map<String, Value>,
    pub probability: f64,
    pub prediction: u8,
}

impl PredictionEvent {
    pub fn now(features: Map<String, Value>, probability: f64, prediction: u8) -> Self {
        Self {
            timestamp: Utc::now(),
            features,
            probability,
            prediction,
        }
    }
}

#[derive(Debug)]
pub struct PredictionLog {
    path: PathBuf,
    // Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl PredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, event: &PredictionEvent) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
