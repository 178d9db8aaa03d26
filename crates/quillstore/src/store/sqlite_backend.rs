//! SQLite storage backend.
//!
//! The structured, transactional store preferred whenever it is compiled in.
//! All keys live in a single `kv` table; batches run inside one native SQLite
//! transaction, so [`StorageBackend::write_batch`] is all-or-nothing here.
//!
//! The connection sits behind a `parking_lot::Mutex` so the backend is `Sync`
//! and can be shared with autosave tasks. `close()` drops the connection;
//! every later call fails with a backend error.

use super::backend::{BatchOp, StorageBackend};
use crate::error::{QuillError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a file-backed database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(QuillError::Io)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| QuillError::backend("SQLite connection is closed"))?;
        f(conn).map_err(QuillError::from)
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map(|_| ())
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|_| ())
        })
    }

    fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut keys = Vec::new();
            match prefix {
                Some(p) => {
                    let mut stmt = conn.prepare(
                        "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1",
                    )?;
                    let rows = stmt.query_map(params![p], |row| row.get::<_, String>(0))?;
                    for row in rows {
                        keys.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare("SELECT key FROM kv")?;
                    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                    for row in rows {
                        keys.push(row?);
                    }
                }
            }
            Ok(keys)
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv", []).map(|_| ()))
    }

    fn write_batch(&self, batch: &[BatchOp]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for op in batch {
                match &op.value {
                    Some(value) => {
                        tx.execute(
                            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                            params![op.key, value],
                        )?;
                    }
                    None => {
                        tx.execute("DELETE FROM kv WHERE key = ?1", params![op.key])?;
                    }
                }
            }
            tx.commit()
        })
    }

    fn atomic_batches(&self) -> bool {
        true
    }

    fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| QuillError::from(e))?;
        }
        Ok(())
    }
}
