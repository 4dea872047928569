use crate::ipc::error::{err, ok};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use crate::model::ExecutionStatus;
use serde_json::json;

fn handle_pod_meta_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(pod_id) = str_param(req, "podId") else {
        return err(&req.id, "bad_params", "missing podId", None);
    };
    let bundle = state.store.pod_metadata(pod_id);
    ok(&req.id, json!({ "podId": pod_id, "metadata": bundle }))
}

fn handle_pod_meta_save_plan(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(pod_id) = str_param(req, "podId") else {
        return err(&req.id, "bad_params", "missing podId", None);
    };
    let Some(plan) = req.params.get("plan").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "plan must be an object", None);
    };
    let saved = state.store.save_plan(pod_id, plan);
    ok(&req.id, json!({ "saved": saved }))
}

fn handle_pod_meta_append_history(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(pod_id) = str_param(req, "podId") else {
        return err(&req.id, "bad_params", "missing podId", None);
    };
    let Some(entry) = req.params.get("entry").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "entry must be an object", None);
    };
    let length = state.store.append_plan_history(pod_id, entry.clone());
    ok(&req.id, json!({ "historyLength": length }))
}

fn handle_pod_meta_set_execution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(pod_id) = str_param(req, "podId") else {
        return err(&req.id, "bad_params", "missing podId", None);
    };
    let status: ExecutionStatus = match req
        .params
        .get("execution")
        .cloned()
        .map(serde_json::from_value)
    {
        Some(Ok(v)) => v,
        Some(Err(e)) => return err(&req.id, "bad_params", format!("invalid execution: {}", e), None),
        None => return err(&req.id, "bad_params", "missing execution", None),
    };
    match state.store.set_execution(pod_id, status) {
        Some(saved) => ok(&req.id, json!({ "saved": true, "execution": saved })),
        None => ok(&req.id, json!({ "saved": false })),
    }
}

fn handle_pod_meta_submit_feedback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(pod_id) = str_param(req, "podId") else {
        return err(&req.id, "bad_params", "missing podId", None);
    };
    let Some(entry) = req.params.get("entry").filter(|v| v.is_object()) else {
        return err(&req.id, "bad_params", "entry must be an object", None);
    };
    if entry.get("studentId").and_then(|v| v.as_str()).is_none() {
        return err(&req.id, "bad_params", "entry.studentId is required", None);
    }
    let saved = state.store.submit_feedback(pod_id, entry.clone());
    ok(&req.id, json!({ "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "podMeta.get" => Some(handle_pod_meta_get(state, req)),
        "podMeta.savePlan" => Some(handle_pod_meta_save_plan(state, req)),
        "podMeta.appendHistory" => Some(handle_pod_meta_append_history(state, req)),
        "podMeta.setExecution" => Some(handle_pod_meta_set_execution(state, req)),
        "podMeta.submitFeedback" => Some(handle_pod_meta_submit_feedback(state, req)),
        _ => None,
    }
}
