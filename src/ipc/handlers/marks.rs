use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{protect_error_response, update_failure_response};
use crate::ipc::types::{AppState, Request};
use crate::marks::MarkRecord;
use crate::validate::validate_marks;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    match p.marks_snapshot() {
        Ok(marks) => {
            let count = marks.len();
            ok(&req.id, json!({ "marks": marks, "count": count }))
        }
        Err(e) => protect_error_response(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let Some(raw) = req.params.get("record") else {
        return err(&req.id, "bad_params", "missing params.record", None);
    };
    let mut record: MarkRecord = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid record: {e}"),
                None,
            )
        }
    };

    // A brand-new record gets an id here at the boundary; an update to an
    // existing (studentId, examId) pair keeps the stored id.
    if record.id.is_none() {
        let current = match p.marks_snapshot() {
            Ok(marks) => marks,
            Err(e) => return protect_error_response(&req.id, &e),
        };
        if !current.iter().any(|m| m.pair_matches(&record)) {
            record.id = Some(Uuid::new_v4().to_string());
        }
    }
    let record_id = record.id.clone();

    match p.update_record(record) {
        Ok(outcome) => {
            let mut result = json!({
                "count": outcome.count,
                "action": outcome.action,
            });
            if let Some(id) = record_id {
                result["id"] = json!(id);
            }
            ok(&req.id, result)
        }
        Err(failure) => update_failure_response(&req.id, &failure),
    }
}

fn handle_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    let marks: Vec<MarkRecord> = match req.params.get("records") {
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(records) => records,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("invalid records: {e}"),
                    None,
                )
            }
        },
        None => match p.marks_snapshot() {
            Ok(marks) => marks,
            Err(e) => return protect_error_response(&req.id, &e),
        },
    };

    let issues = validate_marks(&marks);
    let valid = issues.is_empty();
    ok(&req.id, json!({ "issues": issues, "valid": valid }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.get" => Some(handle_get(state, req)),
        "marks.update" => Some(handle_update(state, req)),
        "marks.validate" => Some(handle_validate(state, req)),
        _ => None,
    }
}
