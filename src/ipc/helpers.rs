use std::time::Duration;

use serde_json::{json, Value};

use crate::ipc::types::{AppState, Request};
use crate::model::{PODS, STUDENTS};
use crate::store::keys;
use crate::sync::failure_json;

pub fn str_param<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Caller-supplied deadline for remote calls.
pub fn timeout_param(req: &Request) -> Option<Duration> {
    req.params
        .get("timeoutMs")
        .and_then(|v| v.as_u64())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

pub fn auto_cloud_sync_enabled(state: &AppState) -> bool {
    state.store.flag(keys::AUTO_CLOUD_SYNC_ENABLED, false)
}

/// Pushes the current collections.
pub fn push_current(state: &AppState, timeout: Option<Duration>) -> Value {
    let students: Vec<Value> = state.store.load_collection(STUDENTS);
    let pods: Vec<Value> = state.store.load_collection(PODS);
    let pushed = state
        .runtime
        .block_on(state.cloud.push(&state.store, &students, &pods, timeout));
    match pushed {
        Ok(receipt) => json!({
            "success": true,
            "timestamp": receipt.timestamp,
            "students": receipt.students,
            "pods": receipt.pods,
            "podsWithMetadata": receipt.pods_with_metadata,
        }),
        Err(e) => failure_json(&e),
    }
}

/// Follows a roster mutation with a push when auto cloud sync is on. The
/// mutation's own result never depends on the outcome.
pub fn after_roster_write(state: &AppState, collection: &str, result: &mut Value) {
    if collection != STUDENTS && collection != PODS {
        return;
    }
    if !auto_cloud_sync_enabled(state) || !state.cloud.is_enabled() {
        return;
    }
    result["cloudSync"] = push_current(state, None);
}
