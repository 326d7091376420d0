use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtectError, StoreError};
use crate::marks::MarkRecord;
use crate::store::SharedStore;

pub const DEFAULT_BACKUP_PREFIX: &str = "marks_backup_";
pub const DEFAULT_MAX_BACKUPS: usize = 50;

// Zero-padded so lexical key order equals numeric sequence order.
const SEQ_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupAction {
    Save,
    BeforeUpdate,
    AfterUpdate,
    SystemInit,
}

impl BackupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupAction::Save => "save",
            BackupAction::BeforeUpdate => "before_update",
            BackupAction::AfterUpdate => "after_update",
            BackupAction::SystemInit => "system_init",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "save" => Some(BackupAction::Save),
            "before_update" => Some(BackupAction::BeforeUpdate),
            "after_update" => Some(BackupAction::AfterUpdate),
            "system_init" => Some(BackupAction::SystemInit),
            _ => None,
        }
    }
}

/// One immutable entry of the backup log. Entries are created, never
/// mutated, and deleted only by eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub seq: u64,
    pub action: BackupAction,
    pub created_at: String,
    pub count: usize,
    /// SHA-256 hex digest of the compact serialization of `marks`,
    /// checked before a snapshot is restored.
    pub checksum: String,
    pub marks: Vec<MarkRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub seq: u64,
    pub action: BackupAction,
    pub created_at: String,
    pub count: usize,
}

impl From<&BackupRecord> for BackupInfo {
    fn from(record: &BackupRecord) -> Self {
        Self {
            seq: record.seq,
            action: record.action,
            created_at: record.created_at.clone(),
            count: record.count,
        }
    }
}

/// Snapshot log over the key-value store: an explicit ordered log keyed by
/// a monotonically increasing sequence number, capped at `max_backups`
/// with strict oldest-first eviction.
#[derive(Clone)]
pub struct BackupManager {
    store: SharedStore,
    prefix: String,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(store: SharedStore, prefix: impl Into<String>, max_backups: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_backups,
        }
    }

    pub fn checksum(marks: &[MarkRecord]) -> Result<String, serde_json::Error> {
        let compact = serde_json::to_string(marks)?;
        let mut hasher = Sha256::new();
        hasher.update(compact.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    fn key_for(&self, seq: u64) -> String {
        format!("{}{:0width$}", self.prefix, seq, width = SEQ_WIDTH)
    }

    fn seq_of(&self, key: &str) -> Option<u64> {
        key.strip_prefix(&self.prefix)?.parse().ok()
    }

    /// Serialize the collection into a new log entry and prune the tail.
    /// A prune failure is logged and does not fail the create.
    pub fn create(
        &self,
        marks: &[MarkRecord],
        action: BackupAction,
    ) -> Result<String, ProtectError> {
        let seq = self
            .next_seq()
            .map_err(|e| ProtectError::Backup(format!("sequence scan failed: {e}")))?;
        let record = BackupRecord {
            seq,
            action,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            count: marks.len(),
            checksum: Self::checksum(marks)
                .map_err(|e| ProtectError::Backup(format!("checksum failed: {e}")))?,
            marks: marks.to_vec(),
        };
        let key = self.key_for(seq);
        let payload = serde_json::to_string(&record)
            .map_err(|e| ProtectError::Backup(format!("serialization failed: {e}")))?;
        self.store
            .set(&key, &payload)
            .map_err(|e| ProtectError::Backup(format!("snapshot write failed: {e}")))?;

        if let Err(e) = self.prune() {
            tracing::warn!(error = %e, "backup prune failed");
        }
        tracing::debug!(key = %key, action = action.as_str(), count = record.count, "created backup");
        Ok(key)
    }

    /// Ascending sequence numbers of all log entries.
    pub fn sequences(&self) -> Result<Vec<u64>, StoreError> {
        let mut seqs: Vec<u64> = self
            .store
            .keys()?
            .iter()
            .filter_map(|k| self.seq_of(k))
            .collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    fn next_seq(&self) -> Result<u64, StoreError> {
        Ok(self.sequences()?.last().copied().unwrap_or(0) + 1)
    }

    pub fn latest_key(&self) -> Result<Option<String>, StoreError> {
        Ok(self.sequences()?.last().map(|&seq| self.key_for(seq)))
    }

    pub fn read(&self, key: &str) -> Result<BackupRecord, StoreError> {
        let payload = self.store.get(key)?.ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup {key} is missing"),
            ))
        })?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Ascending metadata view of the log, for status reporting.
    pub fn list(&self) -> Result<Vec<BackupInfo>, StoreError> {
        Ok(self.records()?.iter().map(BackupInfo::from).collect())
    }

    /// Ascending full log entries, for the bundle exporter.
    pub fn records(&self) -> Result<Vec<BackupRecord>, StoreError> {
        let mut out = Vec::new();
        for seq in self.sequences()? {
            out.push(self.read(&self.key_for(seq))?);
        }
        Ok(out)
    }

    /// Delete the oldest entries beyond the cap. Strict FIFO, no pinning.
    pub fn prune(&self) -> Result<(), StoreError> {
        let seqs = self.sequences()?;
        if seqs.len() <= self.max_backups {
            return Ok(());
        }
        let excess = seqs.len() - self.max_backups;
        for &seq in &seqs[..excess] {
            self.store.remove(&self.key_for(seq))?;
        }
        tracing::debug!(removed = excess, "pruned old backups");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
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

    fn manager(cap: usize) -> BackupManager {
        BackupManager::new(Arc::new(MemoryStore::new()), DEFAULT_BACKUP_PREFIX, cap)
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let backups = manager(10);
        let k1 = backups.create(&[], BackupAction::Save).unwrap();
        let k2 = backups.create(&[mark("s1", 80.0)], BackupAction::BeforeUpdate).unwrap();
        let k3 = backups.create(&[mark("s1", 90.0)], BackupAction::AfterUpdate).unwrap();

        assert_eq!(backups.sequences().unwrap(), vec![1, 2, 3]);
        assert!(k1 < k2 && k2 < k3);
    }

    #[test]
    fn snapshot_roundtrip_preserves_marks_and_metadata() {
        let backups = manager(10);
        let marks = vec![mark("s1", 80.0), mark("s2", 55.0)];
        let key = backups.create(&marks, BackupAction::BeforeUpdate).unwrap();

        let record = backups.read(&key).unwrap();
        assert_eq!(record.seq, 1);
        assert_eq!(record.action, BackupAction::BeforeUpdate);
        assert_eq!(record.count, 2);
        assert_eq!(record.marks, marks);
        assert_eq!(record.checksum, BackupManager::checksum(&marks).unwrap());
    }

    #[test]
    fn eviction_removes_the_oldest_first() {
        let backups = manager(3);
        for i in 0..5u64 {
            backups
                .create(&[mark("s1", i as f64)], BackupAction::Save)
                .unwrap();
        }

        assert_eq!(backups.sequences().unwrap(), vec![3, 4, 5]);

        // The survivors are the newest three, unchanged.
        let latest = backups.latest_key().unwrap().expect("latest");
        assert_eq!(backups.read(&latest).unwrap().marks[0].score, 4.0);
    }

    #[test]
    fn cap_boundary_is_exact() {
        let backups = manager(3);
        for _ in 0..3 {
            backups.create(&[], BackupAction::Save).unwrap();
        }
        assert_eq!(backups.sequences().unwrap().len(), 3);

        backups.create(&[], BackupAction::Save).unwrap();
        assert_eq!(backups.sequences().unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn sequences_ignore_unrelated_keys() {
        let store = Arc::new(MemoryStore::new());
        store.set("marks", "[]").unwrap();
        store.set("marks_temp", "[]").unwrap();
        let backups = BackupManager::new(store, DEFAULT_BACKUP_PREFIX, 10);

        backups.create(&[], BackupAction::Save).unwrap();
        assert_eq!(backups.sequences().unwrap(), vec![1]);
    }

    #[test]
    fn list_is_ascending_metadata() {
        let backups = manager(10);
        backups.create(&[], BackupAction::SystemInit).unwrap();
        backups.create(&[mark("s1", 1.0)], BackupAction::Save).unwrap();

        let infos = backups.list().unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].seq, 1);
        assert_eq!(infos[0].action, BackupAction::SystemInit);
        assert_eq!(infos[1].seq, 2);
        assert_eq!(infos[1].count, 1);
    }
}
