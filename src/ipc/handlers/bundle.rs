use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_workspace_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(out_path) = str_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    let entries = state.store.entries();
    let export = match backup::export_store_bundle(&entries, &PathBuf::from(out_path)) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count
        }),
    )
}

fn handle_workspace_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(in_path) = str_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };

    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "bad_params",
            "inPath does not exist",
            Some(json!({ "path": in_path })),
        );
    }

    let import = match backup::import_store_bundle(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": in_path })),
            )
        }
    };
    if !state.store.replace_entries(&import.entries) {
        return err(&req.id, "store_unavailable", "failed to write imported entries", None);
    }
    // Imported entries may carry remote settings.
    state.reload_remote();

    ok(
        &req.id,
        json!({
            "ok": true,
            "bundleFormatDetected": import.bundle_format_detected,
            "entryCount": import.entries.len(),
            "remoteEnabled": state.cloud.is_enabled(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "workspace.exportBundle" => Some(handle_workspace_export_bundle(state, req)),
        "workspace.importBundle" => Some(handle_workspace_import_bundle(state, req)),
        _ => None,
    }
}
