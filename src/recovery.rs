use serde::Serialize;

use crate::backup::BackupManager;
use crate::error::ProtectError;
use crate::marks;
use crate::store::SharedStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub backup_key: String,
    pub restored: usize,
}

/// Restores the primary key from the most recent snapshot. The snapshot's
/// bytes are checksum-verified, but its domain invariants are not
/// re-validated: a snapshot was valid when it was taken and is trusted as
/// the rollback point.
pub struct RecoveryManager {
    store: SharedStore,
    primary_key: String,
    backups: BackupManager,
}

impl RecoveryManager {
    pub fn new(store: SharedStore, primary_key: impl Into<String>, backups: BackupManager) -> Self {
        Self {
            store,
            primary_key: primary_key.into(),
            backups,
        }
    }

    pub fn recover(&self) -> Result<RecoveryReport, ProtectError> {
        let key = self
            .backups
            .latest_key()
            .map_err(|e| ProtectError::Recovery(format!("backup enumeration failed: {e}")))?
            .ok_or_else(|| ProtectError::Recovery("no backups available".to_string()))?;

        let record = self
            .backups
            .read(&key)
            .map_err(|e| ProtectError::Recovery(format!("backup {key} unreadable: {e}")))?;

        let expected = BackupManager::checksum(&record.marks)
            .map_err(|e| ProtectError::Recovery(format!("checksum failed: {e}")))?;
        if expected != record.checksum {
            return Err(ProtectError::Recovery(format!(
                "backup {key} failed checksum verification"
            )));
        }

        let payload = marks::encode(&record.marks)
            .map_err(|e| ProtectError::Recovery(format!("serialization failed: {e}")))?;
        self.store
            .set(&self.primary_key, &payload)
            .map_err(|e| ProtectError::Recovery(format!("restore write failed: {e}")))?;

        tracing::info!(backup = %key, restored = record.marks.len(), "restored collection from backup");
        Ok(RecoveryReport {
            backup_key: key,
            restored: record.marks.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backup::BackupAction;
    use crate::marks::MarkRecord;
    use crate::store::{KvStore, MemoryStore};

    fn mark(student: &str, score: f64) -> MarkRecord {
        MarkRecord {
            id: None,
            student_id: student.to_string(),
            exam_id: "e1".to_string(),
            score,
            max_score: Some(100.0),
        }
    }

    fn setup() -> (Arc<MemoryStore>, BackupManager, RecoveryManager) {
        let store = Arc::new(MemoryStore::new());
        let backups = BackupManager::new(store.clone(), "marks_backup_", 10);
        let recovery = RecoveryManager::new(store.clone(), "marks", backups.clone());
        (store, backups, recovery)
    }

    #[test]
    fn recovers_from_the_most_recent_backup() {
        let (store, backups, recovery) = setup();
        backups.create(&[mark("s1", 10.0)], BackupAction::Save).unwrap();
        let newest = vec![mark("s1", 20.0), mark("s2", 30.0)];
        backups.create(&newest, BackupAction::BeforeUpdate).unwrap();

        store.set("marks", "garbage").unwrap();
        let report = recovery.recover().unwrap();

        assert_eq!(report.restored, 2);
        let restored = marks::decode(&store.get("marks").unwrap().unwrap()).unwrap();
        assert_eq!(restored, newest);
    }

    #[test]
    fn empty_backup_log_is_a_recovery_error() {
        let (_store, _backups, recovery) = setup();
        let err = recovery.recover().unwrap_err();
        assert!(matches!(err, ProtectError::Recovery(ref m) if m.contains("no backups")));
    }

    #[test]
    fn checksum_mismatch_is_a_recovery_error() {
        let (store, backups, recovery) = setup();
        let key = backups.create(&[mark("s1", 10.0)], BackupAction::Save).unwrap();

        // Tamper with the stored snapshot's marks without updating its checksum.
        let mut record: serde_json::Value =
            serde_json::from_str(&store.get(&key).unwrap().unwrap()).unwrap();
        record["marks"][0]["score"] = serde_json::json!(99.0);
        store.set(&key, &record.to_string()).unwrap();

        let err = recovery.recover().unwrap_err();
        assert!(matches!(err, ProtectError::Recovery(ref m) if m.contains("checksum")));
    }

    #[test]
    fn restored_payload_is_the_canonical_encoding() {
        let (store, backups, recovery) = setup();
        let snapshot = vec![mark("s1", 42.0)];
        backups.create(&snapshot, BackupAction::Save).unwrap();

        recovery.recover().unwrap();
        assert_eq!(
            store.get("marks").unwrap().unwrap(),
            marks::encode(&snapshot).unwrap()
        );
    }
}
