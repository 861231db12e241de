//! String-valued key/value storage.
//!
//! The durable surface the persistence layer writes to. `set_many` is
//! all-or-nothing so a flush never leaves a half-written snapshot behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::OptionalExtension;

use parley_core::error::ParleyError;

use crate::db::Database;

/// Durable key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Write a single value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), ParleyError>;

    /// Write several values atomically: either all land or none do.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ParleyError>;
}

// =============================================================================
// MemoryKvStore
// =============================================================================

/// In-process store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ParleyError> {
        self.entries
            .lock()
            .map_err(|e| ParleyError::Storage(format!("kv lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ParleyError> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}

// =============================================================================
// SqliteKvStore
// =============================================================================

/// Key/value store backed by the `kv_entries` table.
pub struct SqliteKvStore {
    db: Arc<Database>,
}

impl SqliteKvStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ParleyError::Storage(format!("Failed to read {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, Utc::now().timestamp()],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_entries WHERE key = ?1",
                rusqlite::params![key],
            )
            .map_err(|e| ParleyError::Storage(format!("Failed to remove {}: {}", key, e)))?;
            Ok(())
        })
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), ParleyError> {
        let now = Utc::now().timestamp();
        self.db.with_transaction(|tx| {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                )
                .map_err(|e| ParleyError::Storage(e.to_string()))?;
            for (key, value) in entries {
                stmt.execute(rusqlite::params![key, value, now])
                    .map_err(|e| ParleyError::Storage(format!("Failed to write {}: {}", key, e)))?;
            }
            Ok(())
        })
    }
}
