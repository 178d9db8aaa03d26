//! # Quillstore Architecture
//!
//! Quillstore is the **local-first persistence core** of a long-form writing
//! application. It keeps project documents durable on the user's device,
//! valid across schema changes, saved continuously while the user types, and
//! portable as self-validating archives.
//!
//! It is a library with no presentation layer: nothing in here writes to a
//! terminal, renders UI or exits the process. Every operation takes Rust
//! values and returns `Result`s.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Autosave (autosave.rs)        Archives (archive/)          │
//! │  - debounced per-document      - create / extract / import  │
//! │    saves, state events         - validate / repair / inspect│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Projects (projects.rs, model.rs)                           │
//! │  - typed documents, project subtree, assets, discovery      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StorageManager (store/manager.rs, migrate.rs)              │
//! │  - versioned envelopes, migrate-on-read, snapshots          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StorageBackend (store/)                                    │
//! │  - SqliteBackend (preferred), FlatBackend, MemBackend       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows down on writes: edits go through [`autosave::Autosave`], which
//! calls a save function that writes through the [`store::StorageManager`],
//! which writes an envelope to whichever backend [`store::open_backend`]
//! picked at startup. Archives read a project subtree through the same
//! manager and write imports back through ordinary versioned puts.
//!
//! ## Key Principle: No Silent Data Loss
//!
//! - An absent key is `Ok(None)`; a failed read is an `Err`. The two are
//!   never conflated.
//! - Old records are migrated on read and the result is written back. A
//!   migration that fails fails the read; nothing is defaulted.
//! - Archive problems are reported, and only transformed into a successful
//!   import when the caller asks for repair.
//!
//! ## Testing Strategy
//!
//! Unit tests live next to the code they test and run against
//! [`store::mem_backend::MemBackend`]. On-disk backends are exercised with
//! `tempfile` directories, and autosave timing with tokio's paused clock.
//! Integration tests in `tests/` cover the public surface end to end.
//!
//! ## Module Overview
//!
//! - [`store`]: backends and the storage manager
//! - [`migrate`]: document kinds and per-kind migration chains
//! - [`model`]: typed project documents and the key layout
//! - [`projects`]: project-level operations and discovery
//! - [`autosave`]: debounced saving with state events
//! - [`archive`]: export and import of project archives
//! - [`config`]: configuration
//! - [`init`]: process startup
//! - [`error`]: error types

pub mod archive;
pub mod autosave;
pub mod config;
pub mod error;
pub mod init;
pub mod migrate;
pub mod model;
pub mod projects;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::{QuillError, Result};
