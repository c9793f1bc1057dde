//! Durable device configuration: lifecycle state and hardware id.

use async_trait::async_trait;
use netpulse_core::ports::StateStore;
use netpulse_core::state::AgentState;
use netpulse_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DeviceDocument {
    #[serde(default)]
    hwid: Option<String>,
    #[serde(default)]
    agent_state: Option<String>,
}

/// One small JSON document on disk.
///
/// The state machine is the only writer of `agent_state`; the hardware id
/// is created once and reused forever.
pub struct DeviceConfigStore {
    path: PathBuf,
    document: Mutex<DeviceDocument>,
}

impl DeviceConfigStore {
    /// Open the store, tolerating a missing or corrupt file.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Corrupt device config, starting fresh");
                DeviceDocument::default()
            }),
            Err(_) => DeviceDocument::default(),
        };
        Self {
            path,
            document: Mutex::new(document),
        }
    }

    /// Stable hardware identifier, created on first use.
    pub async fn hwid(&self) -> Result<String> {
        let mut document = self.document.lock().await;
        if let Some(hwid) = &document.hwid {
            return Ok(hwid.clone());
        }
        let created = Uuid::new_v4().to_string();
        document.hwid = Some(created.clone());
        self.persist(&document).await?;
        Ok(created)
    }

    async fn persist(&self, document: &DeviceDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::StateStore(format!("{}: {}", parent.display(), e)))?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::StateStore(format!("{}: {}", self.path.display(), e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for DeviceConfigStore {
    async fn load(&self) -> AgentState {
        self.document
            .lock()
            .await
            .agent_state
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(AgentState::Init)
    }

    async fn save(&self, state: AgentState) -> Result<()> {
        let mut document = self.document.lock().await;
        document.agent_state = Some(state.as_str().to_string());
        self.persist(&document).await
    }
}
