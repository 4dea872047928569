use crate::config::{default_root_path, default_timeout_ms, RemoteSettings};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{push_current, str_param, timeout_param};
use crate::ipc::types::{AppState, Request};
use crate::store::keys;
use crate::sync::failure_json;
use crate::sync::recovery::run_auto_recovery;
use crate::sync::remote;
use serde_json::json;

fn handle_cloud_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(url) = req.params.get("url").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing url", None);
    };
    let url = url.trim();
    if url.is_empty() {
        state.store.remove_key(keys::REMOTE_SETTINGS);
        state.reload_remote();
        return ok(&req.id, json!({ "remoteEnabled": state.cloud.is_enabled() }));
    }

    let timeout_ms = match req.params.get("timeoutMs") {
        None | Some(serde_json::Value::Null) => default_timeout_ms(),
        Some(v) => match v.as_u64().filter(|ms| *ms > 0) {
            Some(ms) => ms,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "timeoutMs must be a positive integer",
                    None,
                )
            }
        },
    };
    let settings = RemoteSettings {
        url: url.to_string(),
        api_key: str_param(req, "apiKey").map(str::to_string),
        root_path: str_param(req, "rootPath")
            .map(str::to_string)
            .unwrap_or_else(default_root_path),
        timeout_ms,
        backend_url: str_param(req, "backendUrl").map(str::to_string),
    };
    if let Err(e) = remote::connect(&settings) {
        return err(&req.id, "bad_params", e.to_string(), Some(json!({ "url": url })));
    }
    if !state.store.set_json(keys::REMOTE_SETTINGS, &settings) {
        return err(&req.id, "store_unavailable", "failed to save remote settings", None);
    }
    state.reload_remote();
    ok(
        &req.id,
        json!({
            "remoteEnabled": true,
            "remote": state.cloud.describe(),
            "rootPath": settings.root_path,
            "timeoutMs": settings.timeout_ms,
        }),
    )
}

fn handle_cloud_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "remoteEnabled": state.cloud.is_enabled(),
            "remote": state.cloud.describe(),
            "lastSync": state.store.get_json::<String>(keys::LAST_CLOUD_SYNC),
            "lastError": state.store.get_json::<String>(keys::LAST_SYNC_ERROR),
            "deviceId": state.store.get_json::<String>(keys::DEVICE_ID),
        }),
    )
}

fn handle_cloud_push(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, push_current(state, timeout_param(req)))
}

fn handle_cloud_pull(state: &mut AppState, req: &Request) -> serde_json::Value {
    let apply = req
        .params
        .get("apply")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let pulled = state
        .runtime
        .block_on(state.cloud.pull(&state.store, timeout_param(req)));
    let pulled = match pulled {
        Ok(p) => p,
        Err(e) => return ok(&req.id, failure_json(&e)),
    };
    let applied = apply && state.cloud.apply(&state.store, &pulled);
    let env = pulled.envelope;
    ok(
        &req.id,
        json!({
            "success": true,
            "students": env.students,
            "pods": env.pods,
            "lastSync": env.last_sync,
            "version": env.version,
            "shape": pulled.shape.as_str(),
            "podMetadataCount": env.pod_metadata.len(),
            "applied": applied,
        }),
    )
}

fn handle_cloud_verify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let expected = |name: &str| req.params.get(name).and_then(|v| v.as_u64());
    let (Some(students), Some(pods)) = (expected("expectedStudents"), expected("expectedPods"))
    else {
        return err(
            &req.id,
            "bad_params",
            "expectedStudents and expectedPods are required",
            None,
        );
    };
    let verified = state.runtime.block_on(state.cloud.verify(
        students as usize,
        pods as usize,
        timeout_param(req),
    ));
    match verified {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => {
            let mut result = failure_json(&e);
            result["verified"] = json!(false);
            ok(&req.id, result)
        }
    }
}

fn handle_cloud_auto_recover(state: &mut AppState, req: &Request) -> serde_json::Value {
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let report = state.runtime.block_on(run_auto_recovery(
        &state.cloud,
        &state.store,
        force,
        timeout_param(req),
    ));
    ok(&req.id, json!(report))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cloud.configure" => Some(handle_cloud_configure(state, req)),
        "cloud.status" => Some(handle_cloud_status(state, req)),
        "cloud.push" => Some(handle_cloud_push(state, req)),
        "cloud.pull" => Some(handle_cloud_pull(state, req)),
        "cloud.verify" => Some(handle_cloud_verify(state, req)),
        "cloud.autoRecover" => Some(handle_cloud_auto_recover(state, req)),
        _ => None,
    }
}
