//! Durable key/value channel used for cross-process event propagation.
//!
//! Models the per-origin storage boundary: string keys to string values,
//! writable from any process and observable by the others. The shipped
//! implementation is a table in the shared sync database; tests use an
//! in-memory map shared between bus instances.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::Database;

/// Durable string key/value storage shared across processes.
pub trait StorageChannel: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn put(&self, key: &str, value: &str) -> Result<()>;
  fn remove(&self, key: &str) -> Result<()>;
}

/// Channel backed by the `channel_kv` table in the sync database.
pub struct SqliteChannel {
  db: Arc<Database>,
}

impl SqliteChannel {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl StorageChannel for SqliteChannel {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.db.lock()?;
    conn
      .query_row(
        "SELECT value FROM channel_kv WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read channel key {}: {}", key, e))
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO channel_kv (key, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write channel key {}: {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM channel_kv WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove channel key {}: {}", key, e))?;
    Ok(())
  }
}

/// In-memory channel. Share one instance between bus instances to simulate
/// two processes watching the same origin storage.
#[derive(Default)]
pub struct MemoryChannel {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryChannel {
  pub fn new() -> Self {
    Self::default()
  }
}

impl StorageChannel for MemoryChannel {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn put(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_channel_roundtrip() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let channel = SqliteChannel::new(db);

    assert_eq!(channel.get("k").unwrap(), None);
    channel.put("k", "v1").unwrap();
    assert_eq!(channel.get("k").unwrap(), Some("v1".to_string()));
    channel.put("k", "v2").unwrap();
    assert_eq!(channel.get("k").unwrap(), Some("v2".to_string()));
    channel.remove("k").unwrap();
    assert_eq!(channel.get("k").unwrap(), None);
  }
}
