//! # Startup
//!
//! [`initialize`] wires the pieces together once per process: find the data
//! directory, load configuration from it, pick a backend, and hand back a
//! [`QuillContext`] owning the shared [`StorageManager`].
//!
//! ## Data Directory Resolution
//!
//! 1. An explicit `data_override` argument.
//! 2. The `QUILLSTORE_DATA` environment variable (mostly for tests and
//!    portable installs).
//! 3. The OS data directory for `quillstore` (via the `directories` crate).
//!
//! `quillstore.toml` is read from that directory. If it sets `data_dir`,
//! storage lives there instead; the config file itself never moves.

use crate::archive::Archiver;
use crate::autosave::{storage_saver, Autosave, AutosaveOptions};
use crate::config::QuillConfig;
use crate::error::{QuillError, Result};
use crate::migrate::default_registry;
use crate::store::{open_backend, StorageManager};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const DATA_ENV: &str = "QUILLSTORE_DATA";

pub struct QuillContext {
    pub manager: Arc<StorageManager>,
    pub config: QuillConfig,
    /// Where the backend keeps its files.
    pub data_dir: PathBuf,
}

impl QuillContext {
    pub fn archiver(&self) -> Archiver<'_> {
        Archiver::with_config(&self.manager, &self.config)
    }

    /// An autosave pipeline writing through this context's manager. Must be
    /// called inside a tokio runtime.
    pub fn autosave<K>(&self, key_for: K) -> Result<Autosave>
    where
        K: Fn(&str) -> String + Send + Sync + 'static,
    {
        Autosave::with_options(
            storage_saver(Arc::clone(&self.manager), key_for),
            AutosaveOptions::from_config(&self.config),
        )
    }

    pub fn close(&self) -> Result<()> {
        self.manager.close()
    }
}

/// The base directory before any `data_dir` redirect from the config file.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_ENV) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("", "", "quillstore")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| QuillError::Config("could not determine a data directory".to_string()))
}

pub fn initialize(data_override: Option<PathBuf>) -> Result<QuillContext> {
    let base = match data_override {
        Some(path) => path,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let config = QuillConfig::load(&base)?;
    initialize_with(config, &base)
}

/// Like [`initialize`] with an already-loaded configuration.
pub fn initialize_with(config: QuillConfig, base: &Path) -> Result<QuillContext> {
    let data_dir = config.data_dir.clone().unwrap_or_else(|| base.to_path_buf());
    std::fs::create_dir_all(&data_dir)?;

    let backend = open_backend(&config, &data_dir)?;
    let manager = StorageManager::init(backend, default_registry()).with_auto_migrate(config.auto_migrate);
    info!(dir = %data_dir.display(), backend = manager.backend_name(), "quillstore initialized");

    Ok(QuillContext {
        manager: Arc::new(manager),
        config,
        data_dir,
    })
}
