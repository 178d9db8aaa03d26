use crate::migrate::DocumentKind;
use thiserror::Error;

/// A migration step failed, or its output did not pass validation.
///
/// The read or import that triggered the migration fails with this error; a
/// partially migrated document is never returned or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationError {
    pub kind: DocumentKind,
    pub key: String,
    pub from_version: u32,
    pub to_version: u32,
    pub failed_at: u32,
    pub reason: String,
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "migrating {} ({}) from v{} to v{} failed at v{}: {}",
            self.key, self.kind, self.from_version, self.to_version, self.failed_at, self.reason
        )
    }
}

impl std::error::Error for MigrationError {}

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Invalid schema version {version} for {kind} (current is {current})")]
    InvalidSchemaVersion {
        kind: DocumentKind,
        version: u32,
        current: u32,
    },

    #[error("Refusing to write {key} at schema v{attempted}: stored record is v{stored}")]
    VersionRegression {
        key: String,
        stored: u32,
        attempted: u32,
    },

    #[error("Corrupted entry {key}: {reason}")]
    CorruptedEntry { key: String, reason: String },

    #[error("Invalid archive: {0}")]
    ArchiveStructure(String),

    #[error("Archive rejected: {0}")]
    ArchiveRejected(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already exists: {0}")]
    ProjectExists(String),

    #[error("Invalid project id \"{0}\": ids must be non-empty and contain no ':'")]
    InvalidProjectId(String),

    #[error("Saving {document_id} failed: {message}")]
    Save {
        document_id: String,
        message: String,
    },

    #[error("Saving {document_id} timed out")]
    SaveTimeout { document_id: String },

    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QuillError {
    pub fn backend(message: impl Into<String>) -> Self {
        QuillError::Backend(message.into())
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;
