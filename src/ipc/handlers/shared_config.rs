use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{str_param, timeout_param};
use crate::ipc::types::{AppState, Request};
use crate::sync::failure_json;
use crate::sync::shared_config::{cached_shared_config, SharedAiConfig};
use serde_json::json;

fn handle_shared_config_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(endpoint), Some(model)) = (str_param(req, "endpoint"), str_param(req, "model")) else {
        return err(&req.id, "bad_params", "endpoint and model are required", None);
    };
    let cfg = SharedAiConfig {
        endpoint: endpoint.to_string(),
        api_key: str_param(req, "apiKey").unwrap_or_default().to_string(),
        model: model.to_string(),
        updated_at: None,
    };
    let saved = state.runtime.block_on(state.cloud.save_shared_config(
        &state.store,
        cfg,
        timeout_param(req),
    ));
    match saved {
        Ok(cfg) => ok(&req.id, json!({ "success": true, "config": cfg })),
        Err(e) => ok(&req.id, failure_json(&e)),
    }
}

fn handle_shared_config_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let loaded = state
        .runtime
        .block_on(state.cloud.load_shared_config(&state.store, timeout_param(req)));
    match loaded {
        Ok(cfg) => ok(&req.id, json!({ "success": true, "config": cfg })),
        Err(e) => {
            let mut result = failure_json(&e);
            result["cached"] = json!(cached_shared_config(&state.store));
            ok(&req.id, result)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sharedConfig.save" => Some(handle_shared_config_save(state, req)),
        "sharedConfig.load" => Some(handle_shared_config_load(state, req)),
        _ => None,
    }
}
