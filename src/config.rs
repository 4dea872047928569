//! Remote connection settings.
//!
//! Read from `rosterd.toml` in the workspace; settings written through
//! `cloud.configure` are kept in the local store and take precedence.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::{keys, LocalStore};

pub const CONFIG_FILE: &str = "rosterd.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub remote: Option<RemoteSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// `https://...` document store or `file:///dir`.
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Prefix for the snapshot and shared config documents.
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Deadline applied when a caller does not pass one.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Co-located backend told about shared AI config changes.
    #[serde(default)]
    pub backend_url: Option<String>,
}

pub fn default_root_path() -> String {
    "roster".to_string()
}

pub fn default_timeout_ms() -> u64 {
    15_000
}

pub fn load_file_config(workspace: &Path) -> anyhow::Result<Option<FileConfig>> {
    let path = workspace.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let cfg: FileConfig = toml::from_str(&text)
        .with_context(|| format!("invalid config {}", path.to_string_lossy()))?;
    Ok(Some(cfg))
}

/// Stored settings first, then the workspace file. `None` means remote sync is disabled.
pub fn resolve_remote(store: &LocalStore, workspace: Option<&Path>) -> Option<RemoteSettings> {
    if let Some(settings) = store.get_json::<RemoteSettings>(keys::REMOTE_SETTINGS) {
        if !settings.url.trim().is_empty() {
            return Some(settings);
        }
    }
    let workspace = workspace?;
    match load_file_config(workspace) {
        Ok(cfg) => cfg
            .and_then(|c| c.remote)
            .filter(|r| !r.url.trim().is_empty()),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "ignoring workspace config");
            None
        }
    }
}
