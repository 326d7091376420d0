use serde_json::json;

use crate::backup::BackupAction;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::protect_error_response;
use crate::ipc::types::{AppState, Request};

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let action = match req.params.get("action").and_then(|v| v.as_str()) {
        None => BackupAction::Save,
        Some(raw) => match BackupAction::parse(raw) {
            Some(action) => action,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown backup action: {raw}"),
                    None,
                )
            }
        },
    };

    let marks = match p.marks_snapshot() {
        Ok(marks) => marks,
        Err(e) => return protect_error_response(&req.id, &e),
    };
    match p.create_backup(&marks, action) {
        Ok(key) => ok(
            &req.id,
            json!({ "backupKey": key, "count": marks.len() }),
        ),
        Err(e) => protect_error_response(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    match p.backups().list() {
        Ok(backups) => {
            let count = backups.len();
            ok(&req.id, json!({ "backups": backups, "count": count }))
        }
        Err(e) => err(&req.id, "backup_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.create" => Some(handle_create(state, req)),
        "backup.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
