use super::backend::{BatchOp, StorageBackend};
use super::record::{decode, encode, Record};
use crate::error::{QuillError, Result};
use crate::migrate::{DocumentKind, MigrationRegistry};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Point-in-time copy of (part of) the keyspace, keyed by record key.
pub type Snapshot = BTreeMap<String, Record>;

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Overrides the manager's `auto_migrate` setting for this read.
    pub auto_migrate: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
pub struct PutOptions {
    /// Tag the value with the kind's current schema version. When false, the
    /// stored record's version is kept, so internal rewrites do not inflate it.
    pub versioned: bool,
    /// Write at an explicit version instead. Validated before anything is written.
    pub schema_version: Option<u32>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            versioned: true,
            schema_version: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Delete every key under this prefix before writing the snapshot.
    pub clear_prefix: Option<String>,
}

/// A single write in a [`StorageManager::transact`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        WriteOp::Put {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }
}

/// Versioned, migrating front door to a [`StorageBackend`].
///
/// Constructed explicitly with [`StorageManager::init`] and shut down with
/// [`StorageManager::close`]; share it behind an `Arc` rather than a global.
pub struct StorageManager {
    backend: Box<dyn StorageBackend>,
    registry: MigrationRegistry,
    auto_migrate: bool,
    closed: AtomicBool,
}

impl StorageManager {
    pub fn init(backend: Box<dyn StorageBackend>, registry: MigrationRegistry) -> Self {
        info!(backend = backend.name(), "storage manager initialized");
        Self {
            backend,
            registry,
            auto_migrate: true,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.auto_migrate = auto_migrate;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Close the backend. Every later operation fails.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(backend = self.backend.name(), "storage manager closed");
        self.backend.close()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QuillError::backend("storage manager is closed"));
        }
        Ok(())
    }

    // --- Reads ---

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_with(key, GetOptions::default())
    }

    pub fn get_with(&self, key: &str, options: GetOptions) -> Result<Option<Value>> {
        Ok(self.get_record(key, options)?.map(|r| r.value))
    }

    /// Read a record, migrating it to the current version when needed.
    ///
    /// A migrated record is written back before it is returned, so the chain
    /// runs at most once per stored record.
    pub fn get_record(&self, key: &str, options: GetOptions) -> Result<Option<Record>> {
        self.ensure_open()?;
        let Some(record) = self.read_raw(key)? else {
            return Ok(None);
        };

        let kind = DocumentKind::from_key(key);
        self.registry
            .validate_schema_version(kind, record.schema_version)?;

        let auto_migrate = options.auto_migrate.unwrap_or(self.auto_migrate);
        if !auto_migrate || !self.registry.needs_migration(kind, record.schema_version) {
            return Ok(Some(record));
        }

        let outcome = self
            .registry
            .migrate(kind, key, record.value, record.schema_version)?;
        let written_at = Utc::now();
        self.backend
            .put(key, &encode(&outcome.value, outcome.migrated_to, written_at)?)?;
        info!(
            key,
            %kind,
            from = outcome.migrated_from,
            to = outcome.migrated_to,
            "migrated record"
        );

        Ok(Some(Record {
            key: key.to_string(),
            value: outcome.value,
            schema_version: outcome.migrated_to,
            written_at: Some(written_at),
        }))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn read_raw(&self, key: &str) -> Result<Option<Record>> {
        match self.backend.get(key)? {
            Some(raw) => Ok(Some(decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    // --- Writes ---

    pub fn put(&self, key: &str, value: &Value) -> Result<()> {
        self.put_with(key, value, PutOptions::default())
    }

    pub fn put_with(&self, key: &str, value: &Value, options: PutOptions) -> Result<()> {
        self.ensure_open()?;
        let payload = self.prepare_put(key, value, options)?;
        self.backend.put(key, &payload)?;
        debug!(key, "put");
        Ok(())
    }

    pub fn put_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, &serde_json::to_value(value)?)
    }

    /// Resolve the version tag, refuse regressions, and build the payload.
    fn prepare_put(&self, key: &str, value: &Value, options: PutOptions) -> Result<String> {
        let kind = DocumentKind::from_key(key);
        let stored = match self.read_raw(key) {
            Ok(record) => record.map(|r| r.schema_version),
            // A corrupt entry has no usable version; overwriting it is the repair.
            Err(QuillError::CorruptedEntry { reason, .. }) => {
                warn!(key, %reason, "overwriting corrupted entry");
                None
            }
            Err(e) => return Err(e),
        };

        let version = match options.schema_version {
            Some(v) => {
                self.registry.validate_schema_version(kind, v)?;
                v
            }
            None if options.versioned => self.registry.current_version(kind),
            None => stored.unwrap_or_else(|| self.registry.current_version(kind)),
        };

        if let Some(stored) = stored {
            if stored > version {
                return Err(QuillError::VersionRegression {
                    key: key.to_string(),
                    stored,
                    attempted: version,
                });
            }
        }

        encode(value, version, Utc::now())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.backend.delete(key)
    }

    pub fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.backend.list(prefix)
    }

    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        warn!(backend = self.backend.name(), "clearing all keys");
        self.backend.clear()
    }

    // --- Grouped writes ---

    /// Apply writes strictly in order.
    ///
    /// Ordered, not isolated: there is no rollback. If an operation fails,
    /// the ones before it stay applied and the error is returned. Other
    /// writers may interleave between operations.
    pub fn transact(&self, ops: Vec<WriteOp>) -> Result<usize> {
        self.ensure_open()?;
        for (applied, op) in ops.iter().enumerate() {
            let outcome = match op {
                WriteOp::Put { key, value } => self.put(key, value),
                WriteOp::Delete { key } => self.delete(key),
            };
            if let Err(e) = outcome {
                warn!(applied, total = ops.len(), error = %e, "transact stopped early");
                return Err(e);
            }
        }
        Ok(ops.len())
    }

    /// Apply writes through the backend's batch primitive.
    ///
    /// All-or-nothing when the backend reports [`StorageBackend::atomic_batches`]
    /// (SQLite); otherwise this has the same guarantees as [`Self::transact`].
    pub fn transact_atomic(&self, ops: Vec<WriteOp>) -> Result<usize> {
        self.ensure_open()?;
        let mut batch = Vec::with_capacity(ops.len());
        for op in &ops {
            batch.push(match op {
                WriteOp::Put { key, value } => {
                    BatchOp::put(key, self.prepare_put(key, value, PutOptions::default())?)
                }
                WriteOp::Delete { key } => BatchOp::delete(key),
            });
        }
        self.backend.write_batch(&batch)?;
        debug!(
            count = batch.len(),
            atomic = self.backend.atomic_batches(),
            "batch written"
        );
        Ok(batch.len())
    }

    // --- Snapshots ---

    /// Copy every record under `prefix` (or all records) without migrating them.
    ///
    /// Concurrent writers are not locked out; the copy is best-effort consistent.
    pub fn create_snapshot(&self, prefix: Option<&str>) -> Result<Snapshot> {
        self.ensure_open()?;
        let mut snapshot = Snapshot::new();
        for key in self.backend.list(prefix)? {
            // A key deleted between list and get is simply absent from the snapshot.
            if let Some(record) = self.read_raw(&key)? {
                snapshot.insert(key, record);
            }
        }
        info!(prefix = prefix.unwrap_or(""), count = snapshot.len(), "snapshot created");
        Ok(snapshot)
    }

    /// Write a snapshot back, keeping each record's schema version.
    ///
    /// Records are replaced, not updated: the snapshot's version is written
    /// even over a newer live record. Older records are migrated on their
    /// next read, not here. Everything goes through one backend batch, puts
    /// before deletes, so a failed restore never removes a live record it
    /// did not also replace (and on SQLite changes nothing at all).
    pub fn restore_snapshot(&self, snapshot: &Snapshot, options: RestoreOptions) -> Result<usize> {
        self.ensure_open()?;

        // Validate every version marker before touching storage.
        for (key, record) in snapshot {
            self.registry
                .validate_schema_version(DocumentKind::from_key(key), record.schema_version)?;
        }

        let written_at = Utc::now();
        let mut batch = Vec::with_capacity(snapshot.len());
        for (key, record) in snapshot {
            batch.push(BatchOp::put(
                key,
                encode(&record.value, record.schema_version, written_at)?,
            ));
        }
        if let Some(prefix) = &options.clear_prefix {
            for key in self.backend.list(Some(prefix))? {
                if !snapshot.contains_key(&key) {
                    batch.push(BatchOp::delete(key));
                }
            }
        }
        self.backend.write_batch(&batch)?;

        info!(count = snapshot.len(), "snapshot restored");
        Ok(snapshot.len())
    }

    // --- Legacy aliases ---

    pub fn get_item(&self, key: &str) -> Result<Option<Value>> {
        self.get(key)
    }

    pub fn set_item(&self, key: &str, value: &Value) -> Result<()> {
        self.put(key, value)
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        self.delete(key)
    }
}
