//! # Storage Layer
//!
//! This module defines the storage abstraction for quillstore. The
//! [`StorageBackend`] trait is the minimal get/put/delete/list/clear surface a
//! storage technology has to provide; [`StorageManager`] sits on top of it and
//! is the single entry point for everything above.
//!
//! ## Two Layers
//!
//! 1. **Backend**: type-erased string payloads keyed by string. Absence is
//!    `Ok(None)`; any I/O failure is an error and is never swallowed here.
//! 2. **Manager**: wraps payloads in a versioned envelope, migrates old
//!    records on read (and writes the result back), snapshots and restores
//!    the keyspace, and groups writes.
//!
//! ## Backends
//!
//! - [`sqlite_backend::SqliteBackend`]: structured and transactional; preferred.
//! - [`flat_backend::FlatBackend`]: one file per key; the fallback when SQLite
//!   is not compiled in or cannot be opened.
//! - [`mem_backend::MemBackend`]: in-memory, for tests and ephemeral stores.
//!
//! Selection happens once, in [`open_backend`]. Nothing above this module
//! knows which backend is active.
//!
//! ## Record Envelope
//!
//! ```text
//! { "schemaVersion": 3, "writtenAt": "2024-05-01T12:00:00Z", "value": { ... } }
//! ```
//!
//! Payloads without an envelope are read as schema v1.

use crate::config::{BackendChoice, QuillConfig};
use crate::error::Result;
use std::path::Path;
use tracing::info;

pub mod backend;
pub mod flat_backend;
pub mod manager;
pub mod mem_backend;
pub mod record;
#[cfg(feature = "sqlite")]
pub mod sqlite_backend;

pub use backend::{BatchOp, StorageBackend};
pub use manager::{GetOptions, PutOptions, RestoreOptions, Snapshot, StorageManager, WriteOp};
pub use record::Record;

/// Pick and open the backend for `data_dir`.
///
/// `Auto` prefers SQLite and falls back to the flat store when SQLite is not
/// compiled in or the database cannot be opened. An explicit `Sqlite` choice
/// never falls back.
pub fn open_backend(config: &QuillConfig, data_dir: &Path) -> Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match config.backend {
        BackendChoice::Flat => Box::new(open_flat(config, data_dir)?),
        BackendChoice::Sqlite => open_sqlite(config, data_dir)?,
        BackendChoice::Auto => match open_sqlite(config, data_dir) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "SQLite unavailable, using flat store");
                Box::new(open_flat(config, data_dir)?)
            }
        },
    };
    info!(backend = backend.name(), dir = %data_dir.display(), "storage backend selected");
    Ok(backend)
}

fn open_flat(config: &QuillConfig, data_dir: &Path) -> Result<flat_backend::FlatBackend> {
    flat_backend::FlatBackend::open(data_dir.join(&config.flat_dir))
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &QuillConfig, data_dir: &Path) -> Result<Box<dyn StorageBackend>> {
    let backend = sqlite_backend::SqliteBackend::open(&data_dir.join(&config.database_file))?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &QuillConfig, _data_dir: &Path) -> Result<Box<dyn StorageBackend>> {
    Err(crate::error::QuillError::backend(
        "SQLite support is not compiled in",
    ))
}
