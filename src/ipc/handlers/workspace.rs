use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::LocalStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "persistent": state.store.is_persistent(),
            "remoteEnabled": state.cloud.is_enabled(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Falls back to the in-memory medium if the database cannot be opened.
    state.store = LocalStore::open(&path);
    state.workspace = Some(path.clone());
    state.reload_remote();
    tracing::info!(
        workspace = %path.display(),
        persistent = state.store.is_persistent(),
        "workspace selected"
    );

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "persistent": state.store.is_persistent(),
            "remoteEnabled": state.cloud.is_enabled(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
