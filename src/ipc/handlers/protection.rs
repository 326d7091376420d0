use crate::ipc::error::{err, ok};
use crate::ipc::handlers::protect_error_response;
use crate::ipc::types::{AppState, Request};
use crate::protect::StatusReport;

fn report_response(id: &str, report: &StatusReport) -> serde_json::Value {
    match serde_json::to_value(report) {
        Ok(v) => ok(id, v),
        Err(e) => err(id, "internal", e.to_string(), None),
    }
}

fn handle_init(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    match p.init() {
        Ok(report) => report_response(&req.id, &report),
        Err(e) => protect_error_response(&req.id, &e),
    }
}

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(p) = state.protection.as_ref() else {
        return err(&req.id, "no_workspace", "no workspace selected", None);
    };
    match p.status() {
        Ok(report) => report_response(&req.id, &report),
        Err(e) => protect_error_response(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "protection.init" => Some(handle_init(state, req)),
        "protection.status" => Some(handle_status(state, req)),
        _ => None,
    }
}
