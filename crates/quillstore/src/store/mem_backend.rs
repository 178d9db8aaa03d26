use super::backend::StorageBackend;
use crate::error::{QuillError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory storage backend.
///
/// Used by tests and for ephemeral stores. Supports simulated write failures
/// and a byte quota so error propagation from the storage layer can be
/// exercised without a real disk.
#[derive(Default)]
pub struct MemBackend {
    entries: RwLock<HashMap<String, String>>,
    simulate_write_error: AtomicBool,
    quota_bytes: RwLock<Option<usize>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Cap the total size of keys plus values. Writes that would exceed it fail.
    pub fn set_quota(&self, bytes: Option<usize>) {
        *self.quota_bytes.write() = bytes;
    }

    /// Test helper: write a raw payload, bypassing quota and failure simulation.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(QuillError::backend("Simulated write error"));
        }
        Ok(())
    }
}

impl StorageBackend for MemBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.write();

        if let Some(quota) = *self.quota_bytes.read() {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(QuillError::backend(format!(
                    "Quota exceeded writing {} ({} of {} bytes used)",
                    key, used, quota
                )));
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let entries = self.entries.read();
        Ok(entries
            .keys()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.check_writable()?;
        self.entries.write().clear();
        Ok(())
    }
}
