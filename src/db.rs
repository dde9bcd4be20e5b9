use std::{collections::HashMap, path::Path, sync::Mutex, time::Duration};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{HubError, Result};
use crate::utils;

pub mod keys {
    pub const EVENTS: &str = "se_events_v2";
    pub const USER: &str = "se_user_v2";
    pub const LEADS: &str = "se_leads_v2";
    pub const THEME: &str = "se_theme_v2";
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives the current value of a key and returns the replacement, or `None`
/// to leave storage untouched.
pub type Transform<'a> = Box<dyn FnOnce(Option<String>) -> Result<Option<String>> + 'a>;

/// Opaque key-value storage for serialized blobs.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Read-modify-write of one key. No other writer, in this process or
    /// another one sharing the backing file, can interleave with it. An error
    /// from `apply` discards the change.
    fn update(&self, key: &str, apply: Transform<'_>) -> Result<()>;
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(&utils::database_path())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| HubError::Poisoned)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS blobs(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl BlobStore for Store {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|_| HubError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM blobs WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| HubError::Poisoned)?;
        conn.execute(
            "INSERT INTO blobs (key, value, updated_at_utc)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at_utc = excluded.updated_at_utc",
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| HubError::Poisoned)?;
        conn.execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn update(&self, key: &str, apply: Transform<'_>) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| HubError::Poisoned)?;
        // IMMEDIATE takes the write lock before the read, so another
        // connection's read-modify-write waits for this one to commit.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT value FROM blobs WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(next) = apply(current)? {
            tx.execute(
                "INSERT INTO blobs (key, value, updated_at_utc)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at_utc = excluded.updated_at_utc",
                params![key, next, Utc::now()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.lock().map_err(|_| HubError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| HubError::Poisoned)?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| HubError::Poisoned)?;
        data.remove(key);
        Ok(())
    }

    fn update(&self, key: &str, apply: Transform<'_>) -> Result<()> {
        let mut data = self.data.lock().map_err(|_| HubError::Poisoned)?;
        if let Some(next) = apply(data.get(key).cloned())? {
            data.insert(key.to_string(), next);
        }
        Ok(())
    }
}
