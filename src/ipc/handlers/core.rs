use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::protect::{MarksProtection, ProtectConfig};
use crate::store::SqliteStore;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
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

    let mut config = ProtectConfig::default();
    if let Some(cap) = req.params.get("maxBackups").and_then(|v| v.as_u64()) {
        config.max_backups = cap as usize;
    }
    if let Some(ms) = req.params.get("lockTimeoutMs").and_then(|v| v.as_u64()) {
        config.lock_timeout = Duration::from_millis(ms);
    }

    match SqliteStore::open(&path) {
        Ok(store) => {
            let protection = MarksProtection::new(Arc::new(store), config);
            protection.subscribe(|event| {
                tracing::debug!(
                    key = %event.key,
                    count = event.count,
                    payload_bytes = event.payload.len(),
                    "collection changed"
                );
            });
            state.protection = Some(protection);
            state.workspace = Some(path.clone());
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "store_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
