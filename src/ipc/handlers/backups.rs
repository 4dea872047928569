use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{after_roster_write, auto_cloud_sync_enabled};
use crate::ipc::types::{AppState, Request};
use crate::model::STUDENTS;
use crate::store::{keys, BACKUP_CAPACITY};
use serde_json::{json, Value};

fn handle_backups_capture(state: &mut AppState, req: &Request) -> serde_json::Value {
    let current: Vec<Value> = state.store.load_collection(STUDENTS);
    let count = current.len();
    let captured = state.store.capture_backup(current);
    ok(&req.id, json!({ "captured": captured, "count": count }))
}

fn handle_backups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let backups: Vec<Value> = state
        .store
        .list_backups()
        .into_iter()
        .enumerate()
        .map(|(index, b)| {
            json!({
                "index": index,
                "ts": b.ts,
                "count": b.data.len(),
                "data": b.data,
            })
        })
        .collect();
    ok(
        &req.id,
        json!({ "backups": backups, "capacity": BACKUP_CAPACITY }),
    )
}

fn restored_result(state: &mut AppState, req: &Request, restored: bool) -> serde_json::Value {
    let mut result = json!({ "restored": restored });
    if restored {
        after_roster_write(state, STUDENTS, &mut result);
    }
    ok(&req.id, result)
}

fn handle_backups_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let index = match req.params.get("index") {
        None | Some(Value::Null) => -1,
        Some(v) => match v.as_i64() {
            Some(i) => i,
            None => return err(&req.id, "bad_params", "index must be an integer", None),
        },
    };
    let restored = state.store.restore_backup(index);
    restored_result(state, req, restored)
}

fn handle_backups_restore_latest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let restored = state.store.restore_latest_backup();
    restored_result(state, req, restored)
}

fn handle_prefs_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "autoBackupEnabled": state.store.auto_backup_enabled(),
            "autoCloudSyncEnabled": auto_cloud_sync_enabled(state),
        }),
    )
}

fn handle_prefs_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let flags = [
        ("autoBackupEnabled", keys::AUTO_BACKUP_ENABLED),
        ("autoCloudSyncEnabled", keys::AUTO_CLOUD_SYNC_ENABLED),
    ];
    for (param, key) in flags {
        match req.params.get(param) {
            None | Some(Value::Null) => {}
            Some(Value::Bool(b)) => {
                if !state.store.set_flag(key, *b) {
                    return err(&req.id, "store_unavailable", format!("failed to save {}", param), None);
                }
            }
            Some(_) => {
                return err(&req.id, "bad_params", format!("{} must be a boolean", param), None)
            }
        }
    }
    handle_prefs_get(state, req)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backups.capture" => Some(handle_backups_capture(state, req)),
        "backups.list" => Some(handle_backups_list(state, req)),
        "backups.restore" => Some(handle_backups_restore(state, req)),
        "backups.restoreLatest" => Some(handle_backups_restore_latest(state, req)),
        "prefs.get" => Some(handle_prefs_get(state, req)),
        "prefs.set" => Some(handle_prefs_set(state, req)),
        _ => None,
    }
}
