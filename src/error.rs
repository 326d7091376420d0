use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::recovery::RecoveryReport;
use crate::validate::Issue;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure taxonomy of the protection core. Every variant except
/// `LockTimeout` triggers an automatic recovery attempt inside
/// `MarksProtection` before it is surfaced to the caller.
#[derive(Debug, Error)]
pub enum ProtectError {
    #[error("collection load failed after {attempts} attempt(s): {reason}")]
    Load { attempts: u32, reason: String },

    #[error("backup creation failed: {0}")]
    Backup(String),

    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<Issue>),

    #[error("write failed: {0}")]
    Write(String),

    #[error("recovery failed: {0}")]
    Recovery(String),

    #[error("timed out waiting for the update lock after {0:?}")]
    LockTimeout(Duration),
}

/// What the recovery pass did after an aborted mutation.
#[derive(Debug)]
pub enum RecoveryDisposition {
    Recovered(RecoveryReport),
    Failed(ProtectError),
    /// Nothing was touched before the abort (e.g. lock timeout), so no
    /// recovery ran.
    Skipped,
}

impl fmt::Display for RecoveryDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryDisposition::Recovered(report) => write!(
                f,
                "restored {} record(s) from {}",
                report.restored, report.backup_key
            ),
            RecoveryDisposition::Failed(e) => write!(f, "{}", e),
            RecoveryDisposition::Skipped => write!(f, "recovery not attempted"),
        }
    }
}

/// Error returned by the mutating coordinator operations: the original
/// cause together with the outcome of the recovery pass, both visible to
/// the caller.
#[derive(Debug, Error)]
#[error("{cause}; {recovery}")]
pub struct UpdateFailure {
    pub cause: ProtectError,
    pub recovery: RecoveryDisposition,
}
