use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::OptionalExtension;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::database::Database;
use crate::error::StoreError;

/// Durable string key → string value storage.
///
/// Values are JSON documents by convention, but the trait itself stores raw
/// strings so legacy non-JSON values can still be read.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Write several keys. Backends that support transactions apply them
    /// all-or-nothing.
    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Read `key` and parse it as JSON. `Ok(None)` when the key is absent.
pub fn read_json(storage: &dyn KeyValueStorage, key: &str) -> Result<Option<Value>, StoreError> {
    match storage.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize `value` and write it under `key`.
pub fn write_json(storage: &dyn KeyValueStorage, key: &str, value: &Value) -> Result<(), StoreError> {
    storage.set(key, &serde_json::to_string(value)?)
}

/// SQLite-backed storage over the `kv` table.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

const UPSERT: &str = "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

impl KeyValueStorage for SqliteStorage {
    #[instrument(skip(self), level = "trace")]
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        })
    }

    #[instrument(skip(self, value), level = "trace")]
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(UPSERT, rusqlite::params![key, value, now])?;
            Ok(())
        })
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_tx(|tx| {
            let mut stmt = tx.prepare(UPSERT)?;
            for (key, value) in entries {
                stmt.execute(rusqlite::params![key, value, now])?;
            }
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
            Ok(n > 0)
        })
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }

    fn is_available(&self) -> bool {
        match self.db.ping() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "storage ping failed");
                false
            }
        }
    }
}

/// In-process storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage that reports itself unavailable and rejects every call.
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            unavailable: true,
        }
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
            unavailable: false,
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory storage disabled".into()));
        }
        Ok(())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.entries.lock();
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn is_available(&self) -> bool {
        !self.unavailable
    }
}
