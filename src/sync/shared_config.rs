//! AI provider settings shared across sessions through the remote replica.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CloudSync, SharedDoc, SyncError};
use crate::store::{keys, now_iso, LocalStore};

const BACKEND_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedAiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CloudSync {
    /// Writes the config to the remote and caches it locally.
    pub async fn save_shared_config(
        &self,
        store: &LocalStore,
        mut cfg: SharedAiConfig,
        timeout: Option<Duration>,
    ) -> Result<SharedAiConfig, SyncError> {
        cfg.updated_at = Some(now_iso());
        let doc = serde_json::to_value(&cfg).map_err(|e| SyncError::Envelope(e.to_string()))?;
        if let Err(e) = self.write_document(SharedDoc::Config, &doc, timeout).await {
            let e = SyncError::from(e);
            if !e.is_disabled() {
                warn!(error = %e, "shared config push failed");
                store.set_json(keys::LAST_SYNC_ERROR, &e.to_string());
            }
            return Err(e);
        }
        store.set_json(keys::AI_CONFIG, &cfg);
        info!(model = %cfg.model, "shared AI config saved");
        Ok(cfg)
    }

    /// Reads the shared config, caches it and tells the local backend.
    pub async fn load_shared_config(
        &self,
        store: &LocalStore,
        timeout: Option<Duration>,
    ) -> Result<SharedAiConfig, SyncError> {
        let doc = match self.read_document(SharedDoc::Config, timeout).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return Err(SyncError::NoCloudData),
            Err(e) => {
                let e = SyncError::from(e);
                if !e.is_disabled() {
                    warn!(error = %e, "shared config pull failed");
                    store.set_json(keys::LAST_SYNC_ERROR, &e.to_string());
                }
                return Err(e);
            }
        };
        let cfg: SharedAiConfig =
            serde_json::from_value(doc).map_err(|e| SyncError::Envelope(e.to_string()))?;
        store.set_json(keys::AI_CONFIG, &cfg);
        if let Some(url) = self.backend_url() {
            notify_backend(url, &cfg).await;
        }
        Ok(cfg)
    }
}

pub fn cached_shared_config(store: &LocalStore) -> Option<SharedAiConfig> {
    store.get_json(keys::AI_CONFIG)
}

/// Best-effort; failures are only logged.
async fn notify_backend(base: &str, cfg: &SharedAiConfig) {
    let url = format!("{}/api/config", base.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let sent = tokio::time::timeout(
        BACKEND_NOTIFY_TIMEOUT,
        client.post(&url).json(cfg).send(),
    )
    .await;
    match sent {
        Ok(Ok(resp)) if resp.status().is_success() => {
            info!(url = %url, "backend notified of shared config");
        }
        Ok(Ok(resp)) => warn!(url = %url, status = %resp.status(), "backend rejected shared config"),
        Ok(Err(e)) => warn!(url = %url, error = %e, "backend notify failed"),
        Err(_) => warn!(url = %url, "backend notify timed out"),
    }
}
