//! Shared persistent key-value store backing every collection and session field

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Collection keys
pub const KEY_USERS: &str = "users";
pub const KEY_TASKS: &str = "tasks";
pub const KEY_RECORDINGS: &str = "recordings";
pub const KEY_CLASSIFICATIONS: &str = "classifications";
pub const KEY_MESSAGES: &str = "messages";

/// Scalar session keys, set at login and cleared at logout
pub const KEY_IS_LOGGED_IN: &str = "isLoggedIn";
pub const KEY_ROLE: &str = "role";
pub const KEY_USERNAME: &str = "username";
pub const KEY_NPM: &str = "npm";
pub const KEY_TOKEN: &str = "token";

/// String-keyed, JSON-valued durable store.
///
/// A `write` is a full replace of the value under its key; there is no
/// partial write and no transaction across keys. Callers that mutate a
/// collection read it, change their local copy, and write the whole result
/// back (read-modify-write). Two stores opened on the same path are not
/// synchronized against each other: the last write wins wholesale.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.as_ref().to_path_buf()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store at the platform default location
    pub fn open_default() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or_else(|| Error::Validation("no data directory on this platform".to_string()))?;
        Self::open(base.join("choircheck").join("store.db"))
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Path this store was opened at, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        info!("Store schema initialized");
        Ok(())
    }

    /// Read and decode the value under `key`.
    ///
    /// Never fails: a missing row, malformed JSON, or a shape mismatch all
    /// decay to `T::default()` — indistinguishable from "nothing saved yet".
    pub fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.get_raw(key) {
            Some(raw) => raw,
            None => return T::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                debug!("Discarding undecodable value under '{}': {}", key, err);
                T::default()
            }
        }
    }

    /// Serialize `value` and replace whatever is stored under `key`
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, raw, Utc::now().to_rfc3339()],
        )?;
        debug!("Wrote {} bytes under '{}'", raw.len(), key);
        Ok(())
    }

    /// Get a scalar value stored as a plain string
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|err| {
            debug!("Read of '{}' failed: {}", key, err);
            None
        })
    }

    /// Set a scalar value stored as a plain string
    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete the value under `key`, if any
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// SQLite's data version counter; bumps when another connection writes
    pub fn data_version(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let version = conn.query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version)
    }
}
