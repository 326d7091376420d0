use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::backup::{
    BackupAction, BackupInfo, BackupManager, DEFAULT_BACKUP_PREFIX, DEFAULT_MAX_BACKUPS,
};
use crate::error::{ProtectError, RecoveryDisposition, UpdateFailure};
use crate::marks::{self, MarkRecord, MergeAction};
use crate::recovery::RecoveryManager;
use crate::store::SharedStore;
use crate::validate::{validate_marks, Issue};
use crate::writer::AtomicWriter;

#[derive(Debug, Clone)]
pub struct ProtectConfig {
    pub collection_key: String,
    pub staging_key: String,
    pub backup_prefix: String,
    pub max_backups: usize,
    pub load_attempts: u32,
    pub retry_backoff: Duration,
    pub lock_timeout: Duration,
}

impl Default for ProtectConfig {
    fn default() -> Self {
        Self {
            collection_key: "marks".to_string(),
            staging_key: "marks_temp".to_string(),
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
            load_attempts: 3,
            retry_backoff: Duration::from_millis(100),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub count: usize,
    pub action: MergeAction,
}

/// Emitted to subscribers after every committed mutation of the primary
/// key. `payload` is the exact serialized value the key now holds.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub payload: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub marks_count: usize,
    pub backups_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_backup: Option<BackupInfo>,
    pub validation_issues: Vec<Issue>,
}

type ChangeCallback = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Update coordinator for the protected marks collection.
///
/// All mutation funnels through here: load with retry, pre-image backup,
/// merge, validate, staged atomic write, post-image backup, notify. A
/// bounded-wait mutex guarantees at most one in-flight update; every abort
/// after the lock is held runs the recovery path before the error is
/// returned.
pub struct MarksProtection {
    store: SharedStore,
    config: ProtectConfig,
    backups: BackupManager,
    writer: AtomicWriter,
    recovery: RecoveryManager,
    update_lock: Mutex<()>,
    subscribers: Mutex<Vec<ChangeCallback>>,
}

impl MarksProtection {
    pub fn new(store: SharedStore, config: ProtectConfig) -> Self {
        let backups = BackupManager::new(
            store.clone(),
            config.backup_prefix.clone(),
            config.max_backups,
        );
        let writer = AtomicWriter::new(
            store.clone(),
            config.collection_key.clone(),
            config.staging_key.clone(),
        );
        let recovery = RecoveryManager::new(
            store.clone(),
            config.collection_key.clone(),
            backups.clone(),
        );
        Self {
            store,
            config,
            backups,
            writer,
            recovery,
            update_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Register a change observer. Callbacks run synchronously after a
    /// commit, while the update lock is still held.
    pub fn subscribe(&self, callback: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.subscribers.lock().push(Box::new(callback));
    }

    fn notify(&self, event: &ChangeEvent) {
        for callback in self.subscribers.lock().iter() {
            callback(event);
        }
    }

    /// Merge one record into the collection: in-place replacement when the
    /// (studentId, examId) pair exists, append otherwise.
    pub fn update_record(&self, incoming: MarkRecord) -> Result<UpdateOutcome, UpdateFailure> {
        self.guarded(|| self.update_locked(incoming))
    }

    /// Replace the whole collection (bundle import): validate, snapshot the
    /// pre-import state, then commit through the atomic writer. Returns the
    /// new record count.
    pub fn replace_collection(&self, records: Vec<MarkRecord>) -> Result<usize, UpdateFailure> {
        self.guarded(|| self.replace_locked(records))
    }

    /// Snapshot the current collection with an explicit action tag.
    pub fn create_backup(
        &self,
        marks: &[MarkRecord],
        action: BackupAction,
    ) -> Result<String, ProtectError> {
        self.backups.create(marks, action)
    }

    /// Read of the primary key, with the same retry policy the coordinator
    /// itself uses. An absent key is an empty collection.
    pub fn marks_snapshot(&self) -> Result<Vec<MarkRecord>, ProtectError> {
        self.load_marks()
    }

    pub fn status(&self) -> Result<StatusReport, ProtectError> {
        let marks = self.load_marks()?;
        let list = self
            .backups
            .list()
            .map_err(|e| ProtectError::Backup(format!("backup enumeration failed: {e}")))?;
        Ok(StatusReport {
            marks_count: marks.len(),
            backups_count: list.len(),
            last_backup: list.last().cloned(),
            validation_issues: validate_marks(&marks),
        })
    }

    /// Snapshot any pre-existing collection, then report status.
    pub fn init(&self) -> Result<StatusReport, ProtectError> {
        let marks = self.load_marks()?;
        if !marks.is_empty() {
            self.backups.create(&marks, BackupAction::SystemInit)?;
        }
        tracing::info!(count = marks.len(), "protection initialized");
        self.status()
    }

    fn guarded<T>(
        &self,
        op: impl FnOnce() -> Result<T, ProtectError>,
    ) -> Result<T, UpdateFailure> {
        let Some(_guard) = self.update_lock.try_lock_for(self.config.lock_timeout) else {
            return Err(UpdateFailure {
                cause: ProtectError::LockTimeout(self.config.lock_timeout),
                recovery: RecoveryDisposition::Skipped,
            });
        };
        match op() {
            Ok(value) => Ok(value),
            Err(cause) => {
                tracing::error!(error = %cause, "update aborted, attempting recovery");
                let recovery = match self.recovery.recover() {
                    Ok(report) => RecoveryDisposition::Recovered(report),
                    Err(e) => {
                        tracing::error!(error = %e, "recovery failed");
                        RecoveryDisposition::Failed(e)
                    }
                };
                Err(UpdateFailure { cause, recovery })
            }
        }
    }

    fn update_locked(&self, incoming: MarkRecord) -> Result<UpdateOutcome, ProtectError> {
        let mut marks = self.load_marks()?;

        // No write is attempted without a rollback point.
        self.backups.create(&marks, BackupAction::BeforeUpdate)?;

        let action = match marks.iter().position(|m| m.pair_matches(&incoming)) {
            Some(pos) => {
                marks[pos].merge_from(incoming);
                MergeAction::Updated
            }
            None => {
                marks.push(incoming);
                MergeAction::Added
            }
        };

        let issues = validate_marks(&marks);
        if !issues.is_empty() {
            return Err(ProtectError::Validation(issues));
        }

        let payload = marks::encode(&marks)
            .map_err(|e| ProtectError::Write(format!("serialization failed: {e}")))?;
        self.writer.write(&payload)?;

        // Asymmetric by design of the source system: a post-image backup
        // failure does not invalidate the already-verified commit.
        if let Err(e) = self.backups.create(&marks, BackupAction::AfterUpdate) {
            tracing::warn!(error = %e, "post-update backup failed; committed write stands");
        }

        let event = ChangeEvent {
            key: self.config.collection_key.clone(),
            payload,
            count: marks.len(),
        };
        self.notify(&event);
        tracing::info!(count = event.count, action = action.as_str(), "collection update committed");

        Ok(UpdateOutcome {
            count: event.count,
            action,
        })
    }

    fn replace_locked(&self, records: Vec<MarkRecord>) -> Result<usize, ProtectError> {
        let issues = validate_marks(&records);
        if !issues.is_empty() {
            return Err(ProtectError::Validation(issues));
        }

        let current = self.load_marks()?;
        self.backups.create(&current, BackupAction::Save)?;

        let payload = marks::encode(&records)
            .map_err(|e| ProtectError::Write(format!("serialization failed: {e}")))?;
        self.writer.write(&payload)?;

        let event = ChangeEvent {
            key: self.config.collection_key.clone(),
            payload,
            count: records.len(),
        };
        self.notify(&event);
        tracing::info!(count = records.len(), "collection replaced");
        Ok(records.len())
    }

    fn load_marks(&self) -> Result<Vec<MarkRecord>, ProtectError> {
        let attempts = self.config.load_attempts.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match self.try_load() {
                Ok(marks) => return Ok(marks),
                Err(reason) => {
                    tracing::warn!(attempt, %reason, "collection load attempt failed");
                    last_reason = reason;
                    if attempt < attempts {
                        std::thread::sleep(self.config.retry_backoff);
                    }
                }
            }
        }
        Err(ProtectError::Load {
            attempts,
            reason: last_reason,
        })
    }

    fn try_load(&self) -> Result<Vec<MarkRecord>, String> {
        match self.store.get(&self.config.collection_key) {
            Ok(None) => Ok(Vec::new()),
            Ok(Some(raw)) => marks::decode(&raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}
