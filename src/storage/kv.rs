//! Key-value persistence.
//!
//! The queue snapshot is a single serialized value stored under a fixed key.
//! `SqliteKvStore` is the durable medium; `MemoryKvStore` backs tests and
//! embedders that bring their own durability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::RollcallError;

/// A string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, RollcallError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value was not written.
    fn set(&self, key: &str, value: &str) -> Result<(), RollcallError>;

    /// Remove `key`. Returns whether a value existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be written.
    fn remove(&self, key: &str) -> Result<bool, RollcallError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, RollcallError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RollcallError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, RollcallError> {
        (**self).remove(key)
    }
}

/// `SQLite`-backed store using the `kv_store` table.
pub struct SqliteKvStore {
    db: Mutex<Database>,
}

impl SqliteKvStore {
    /// Wrap an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, RollcallError> {
        self.db
            .lock()
            .map_err(|_| RollcallError::Database("Key-value store lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, RollcallError> {
        let db = self.db()?;
        db.connection()
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| RollcallError::Database(format!("Failed to read key {key}: {e}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RollcallError> {
        let db = self.db()?;
        db.connection()
            .execute(
                r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                  ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                 updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| RollcallError::Persistence(format!("Failed to write key {key}: {e}")))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, RollcallError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])
            .map_err(|e| RollcallError::Persistence(format!("Failed to remove key {key}: {e}")))?;
        Ok(rows > 0)
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, RollcallError> {
        self.entries
            .lock()
            .map_err(|_| RollcallError::Persistence("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, RollcallError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RollcallError> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, RollcallError> {
        Ok(self.entries()?.remove(key).is_some())
    }
}
