//! # Configuration
//!
//! Quillstore configuration is managed by [`confique`], which handles layered
//! loading from a TOML file, environment variables, and compiled defaults.
//!
//! ## Storage Hierarchy
//!
//! Configuration is resolved in priority order:
//! 1. **Environment variables**: `QUILLSTORE_BACKEND`, `QUILLSTORE_AUTOSAVE_DEBOUNCE_MS`, etc.
//! 2. **Config file**: `quillstore.toml` in the config directory.
//! 3. **Compiled Defaults**: Built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `backend` | `auto` | `auto`, `sqlite` or `flat` |
//! | `data_dir` | platform data dir | Where the database / flat store lives |
//! | `database_file` | `quillstore.db` | SQLite file name inside `data_dir` |
//! | `flat_dir` | `kv` | Flat store directory inside `data_dir` |
//! | `auto_migrate` | `true` | Migrate old records on read |
//! | `autosave_debounce_ms` | `1000` | Idle interval before an autosave fires |
//! | `autosave_timeout_ms` | `30000` | Upper bound on one save attempt |
//! | `archive_extension` | `quill.tar.gz` | Extension of exported archives |
//! | `archive_name_max_len` | `50` | Max length of the sanitized project name |

use crate::error::{QuillError, Result};
use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "quillstore.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// SQLite when compiled in and it opens, flat files otherwise.
    Auto,
    Sqlite,
    Flat,
}

/// Configuration for quillstore, stored in `quillstore.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QuillConfig {
    #[config(default = "auto", env = "QUILLSTORE_BACKEND")]
    pub backend: BackendChoice,

    /// When absent, `QUILLSTORE_DATA` or the platform data directory is used.
    #[config(env = "QUILLSTORE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[config(default = "quillstore.db")]
    pub database_file: String,

    #[config(default = "kv")]
    pub flat_dir: String,

    #[config(default = true, env = "QUILLSTORE_AUTO_MIGRATE")]
    pub auto_migrate: bool,

    #[config(default = 1000, env = "QUILLSTORE_AUTOSAVE_DEBOUNCE_MS")]
    pub autosave_debounce_ms: u64,

    #[config(default = 30000, env = "QUILLSTORE_AUTOSAVE_TIMEOUT_MS")]
    pub autosave_timeout_ms: u64,

    #[config(default = "quill.tar.gz")]
    pub archive_extension: String,

    #[config(default = 50)]
    pub archive_name_max_len: usize,
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            data_dir: None,
            database_file: "quillstore.db".to_string(),
            flat_dir: "kv".to_string(),
            auto_migrate: true,
            autosave_debounce_ms: 1000,
            autosave_timeout_ms: 30000,
            archive_extension: "quill.tar.gz".to_string(),
            archive_name_max_len: 50,
        }
    }
}

impl QuillConfig {
    /// Load `quillstore.toml` from `dir` (if present) layered over env and defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::builder()
            .env()
            .file(dir.join(CONFIG_FILE))
            .load()
            .map_err(|e| QuillError::Config(e.to_string()))
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn autosave_timeout(&self) -> Duration {
        Duration::from_millis(self.autosave_timeout_ms)
    }

    /// Extension without a leading dot.
    pub fn archive_extension(&self) -> &str {
        self.archive_extension.trim_start_matches('.')
    }
}
