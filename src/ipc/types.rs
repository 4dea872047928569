use std::path::PathBuf;

use serde::Deserialize;

use crate::config;
use crate::store::LocalStore;
use crate::sync::CloudSync;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: LocalStore,
    pub cloud: CloudSync,
    pub runtime: tokio::runtime::Runtime,
}

impl AppState {
    /// Starts on the in-memory store until a workspace is selected.
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            workspace: None,
            store: LocalStore::in_memory(),
            cloud: CloudSync::disabled(),
            runtime,
        })
    }

    /// Rebuilds the synchronizer from stored settings and the workspace file.
    pub fn reload_remote(&mut self) {
        let settings = config::resolve_remote(&self.store, self.workspace.as_deref());
        self.cloud = CloudSync::from_settings(settings.as_ref());
    }
}
