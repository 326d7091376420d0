use std::path::PathBuf;

use serde_json::json;

use crate::exchange;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn path_param(req: &Request, name: &str) -> Option<PathBuf> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let Some(out_path) = path_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing params.outPath", None);
    };

    match exchange::export_marks_bundle(p, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
            }),
        ),
        Err(e) => err(&req.id, "exchange_failed", format!("{e:?}"), None),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let Some(in_path) = path_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing params.inPath", None);
    };

    match exchange::import_marks_bundle(p, &in_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormatDetected": summary.bundle_format_detected,
                "imported": summary.imported,
            }),
        ),
        Err(e) => err(&req.id, "exchange_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.export" => Some(handle_export(state, req)),
        "exchange.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
