use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{after_roster_write, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_collections_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(name) = str_param(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let items: Vec<Value> = state.store.load_collection(name);
    ok(&req.id, json!({ "name": name, "items": items }))
}

fn handle_collections_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(name) = str_param(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(items) = req.params.get("items").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "items must be an array", None);
    };
    let saved = state.store.save_collection(name, items);
    let mut result = json!({ "saved": saved, "count": items.len() });
    if saved {
        after_roster_write(state, name, &mut result);
    }
    ok(&req.id, result)
}

fn handle_records_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(collection) = str_param(req, "collection") else {
        return err(&req.id, "bad_params", "missing collection", None);
    };
    let Some(record) = req.params.get("record").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "record must be an object", None);
    };
    let id_field = str_param(req, "idField").unwrap_or("id");

    let outcome = state.store.upsert(collection, record, id_field);
    let mut result = json!({
        "record": outcome.record,
        "created": outcome.created,
        "saved": outcome.saved,
    });
    if outcome.saved {
        after_roster_write(state, collection, &mut result);
    }
    ok(&req.id, result)
}

fn handle_records_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(collection) = str_param(req, "collection") else {
        return err(&req.id, "bad_params", "missing collection", None);
    };
    let Some(id) = str_param(req, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let id_field = str_param(req, "idField").unwrap_or("id");

    let removed = state.store.remove(collection, id, id_field);
    let mut result = json!({ "removed": removed });
    if removed {
        after_roster_write(state, collection, &mut result);
    }
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "collections.load" => Some(handle_collections_load(state, req)),
        "collections.save" => Some(handle_collections_save(state, req)),
        "records.upsert" => Some(handle_records_upsert(state, req)),
        "records.delete" => Some(handle_records_delete(state, req)),
        _ => None,
    }
}
