pub mod backups;
pub mod core;
pub mod exchange;
pub mod marks;
pub mod protection;

use serde_json::json;

use crate::error::{ProtectError, RecoveryDisposition, UpdateFailure};
use crate::ipc::error::err;

pub(crate) fn protect_error_code(e: &ProtectError) -> &'static str {
    match e {
        ProtectError::Load { .. } => "load_failed",
        ProtectError::Backup(_) => "backup_failed",
        ProtectError::Validation(_) => "validation_failed",
        ProtectError::Write(_) => "write_failed",
        ProtectError::Recovery(_) => "recovery_failed",
        ProtectError::LockTimeout(_) => "lock_timeout",
    }
}

pub(crate) fn protect_error_response(id: &str, e: &ProtectError) -> serde_json::Value {
    let details = match e {
        ProtectError::Validation(issues) => Some(json!({ "issues": issues })),
        _ => None,
    };
    err(id, protect_error_code(e), e.to_string(), details)
}

/// An aborted mutation reports the original cause as the error code and
/// carries the recovery disposition in the details.
pub(crate) fn update_failure_response(id: &str, failure: &UpdateFailure) -> serde_json::Value {
    let recovery = match &failure.recovery {
        RecoveryDisposition::Recovered(report) => json!({
            "recovered": true,
            "restored": report.restored,
            "backupKey": report.backup_key,
        }),
        RecoveryDisposition::Failed(e) => json!({
            "recovered": false,
            "error": e.to_string(),
        }),
        RecoveryDisposition::Skipped => json!({
            "recovered": false,
            "skipped": true,
        }),
    };
    let mut details = json!({ "recovery": recovery });
    if let ProtectError::Validation(issues) = &failure.cause {
        details["issues"] = json!(issues);
    }
    err(
        id,
        protect_error_code(&failure.cause),
        failure.cause.to_string(),
        Some(details),
    )
}
