use crate::error::Result;
use std::sync::Arc;

/// One entry of a batched write. `value: None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOp {
    pub key: String,
    pub value: Option<String>,
}

impl BatchOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// Abstract interface for raw key-value I/O.
///
/// This trait handles the "how" of storage (SQLite, flat files, memory),
/// while [`super::StorageManager`] handles the "what" (versioning, migration,
/// snapshots). Payloads are opaque strings; the backend never looks inside.
///
/// Implementations must be shareable across threads: the autosave pipeline
/// writes from background tasks.
pub trait StorageBackend: Send + Sync {
    /// Short name for logs ("sqlite", "flat", "memory").
    fn name(&self) -> &'static str;

    /// Returns Ok(None) if the key does not exist.
    /// Returns Err only on actual I/O errors (unavailable store, corrupted entry).
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional overwrite. Atomic with respect to readers of this key.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Succeeds whether or not the key existed.
    fn delete(&self, key: &str) -> Result<()>;

    /// All keys, optionally restricted to a prefix. No ordering guarantee.
    fn list(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Remove every key.
    fn clear(&self) -> Result<()>;

    /// Apply a batch of writes.
    ///
    /// The default applies them one by one and stops at the first failure,
    /// leaving earlier writes in place. Backends with native transactions
    /// override this to make the batch all-or-nothing.
    fn write_batch(&self, batch: &[BatchOp]) -> Result<()> {
        for op in batch {
            match &op.value {
                Some(value) => self.put(&op.key, value)?,
                None => self.delete(&op.key)?,
            }
        }
        Ok(())
    }

    /// Whether [`StorageBackend::write_batch`] is all-or-nothing.
    fn atomic_batches(&self) -> bool {
        false
    }

    /// Release underlying resources. Further calls may fail.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Lets a caller keep a handle on a backend it also hands to a manager.
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        (**self).list(prefix)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn write_batch(&self, batch: &[BatchOp]) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn atomic_batches(&self) -> bool {
        (**self).atomic_batches()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
