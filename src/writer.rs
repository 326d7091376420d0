use crate::error::ProtectError;
use crate::store::SharedStore;

/// Staged write protocol against a store with no native transactions:
/// write to the staging key, read back and byte-compare, then write to the
/// primary key and read back and byte-compare again. The primary key is
/// only touched after the staged copy verified, so a failed call leaves it
/// at its pre-call value unless the primary write itself was the step that
/// failed verification.
pub struct AtomicWriter {
    store: SharedStore,
    primary_key: String,
    staging_key: String,
}

impl AtomicWriter {
    pub fn new(
        store: SharedStore,
        primary_key: impl Into<String>,
        staging_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            primary_key: primary_key.into(),
            staging_key: staging_key.into(),
        }
    }

    pub fn write(&self, payload: &str) -> Result<(), ProtectError> {
        self.store
            .set(&self.staging_key, payload)
            .map_err(|e| ProtectError::Write(format!("staging write failed: {e}")))?;
        let staged = self
            .store
            .get(&self.staging_key)
            .map_err(|e| ProtectError::Write(format!("staging read-back failed: {e}")))?;
        if staged.as_deref() != Some(payload) {
            return Err(ProtectError::Write(
                "staging verification mismatch".to_string(),
            ));
        }

        self.store
            .set(&self.primary_key, payload)
            .map_err(|e| ProtectError::Write(format!("primary write failed: {e}")))?;
        let committed = self
            .store
            .get(&self.primary_key)
            .map_err(|e| ProtectError::Write(format!("primary read-back failed: {e}")))?;
        if committed.as_deref() != Some(payload) {
            return Err(ProtectError::Write(
                "primary verification mismatch".to_string(),
            ));
        }

        // Best-effort cleanup; the commit already verified.
        if let Err(e) = self.store.remove(&self.staging_key) {
            tracing::warn!(error = %e, "failed to clear staging key");
        }
        Ok(())
    }
}
