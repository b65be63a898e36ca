//! Last-known-good query results, persisted per logical cache group.
//!
//! Reads fall back here when the remote store is unreachable, so a
//! transient network error degrades to stale-but-present data instead of
//! surfacing to the UI.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;

use crate::db::Database;

/// A stored result set and when it was captured.
#[derive(Debug, Clone)]
pub struct Snapshot {
  pub rows: Vec<Value>,
  pub saved_at: DateTime<Utc>,
}

/// Durable snapshot store, private to one façade instance.
pub struct SnapshotStore {
  db: Arc<Database>,
}

impl SnapshotStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Overwrite the snapshot for a cache group.
  pub fn save(&self, key: &str, table: &str, rows: &[Value]) -> Result<()> {
    let data =
      serde_json::to_vec(rows).map_err(|e| eyre!("Failed to serialize snapshot {}: {}", key, e))?;

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots (snapshot_key, table_name, data, saved_at)
         VALUES (?, ?, ?, ?)",
        params![key, table, data, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to save snapshot {}: {}", key, e))?;

    Ok(())
  }

  /// Load the snapshot for a cache group, if one exists.
  pub fn load(&self, key: &str) -> Result<Option<Snapshot>> {
    let conn = self.db.lock()?;
    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, saved_at FROM snapshots WHERE snapshot_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load snapshot {}: {}", key, e))?;

    match row {
      Some((data, saved_at)) => {
        let rows = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to parse snapshot {}: {}", key, e))?;
        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
          .map_err(|e| eyre!("Failed to parse snapshot timestamp: {}", e))?
          .with_timezone(&Utc);
        Ok(Some(Snapshot { rows, saved_at }))
      }
      None => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_save_load_overwrite() {
    let store = SnapshotStore::new(Arc::new(Database::open_in_memory().unwrap()));

    assert!(store.load("loadChannels").unwrap().is_none());

    store
      .save("loadChannels", "channels", &[json!({"id": 1})])
      .unwrap();
    let snapshot = store.load("loadChannels").unwrap().unwrap();
    assert_eq!(snapshot.rows, vec![json!({"id": 1})]);

    store
      .save("loadChannels", "channels", &[json!({"id": 1}), json!({"id": 2})])
      .unwrap();
    let snapshot = store.load("loadChannels").unwrap().unwrap();
    assert_eq!(snapshot.rows.len(), 2);
  }
}
