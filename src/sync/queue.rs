//! Durable queue of mutations deferred while offline.
//!
//! Entries replay in strict enqueue order and are never deduplicated or
//! merged; if both an update and a delete for the same entity are queued,
//! both replay, in order.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::Database;

/// Kind of deferred mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
  Create,
  Update,
  Delete,
}

impl ChangeOp {
  fn as_str(&self) -> &'static str {
    match self {
      Self::Create => "create",
      Self::Update => "update",
      Self::Delete => "delete",
    }
  }

  fn parse(s: &str) -> Result<Self> {
    match s {
      "create" => Ok(Self::Create),
      "update" => Ok(Self::Update),
      "delete" => Ok(Self::Delete),
      other => Err(eyre!("Unknown change op: {}", other)),
    }
  }
}

/// A mutation recorded for later replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineChange {
  pub op: ChangeOp,
  pub table: String,
  /// Cache group to invalidate once the change lands remotely
  pub cache_key: String,
  pub target_id: Option<String>,
  pub payload: Option<Value>,
  pub queued_at: DateTime<Utc>,
}

/// A queued change plus its queue position id.
#[derive(Debug, Clone)]
pub struct QueuedChange {
  pub id: i64,
  pub change: OfflineChange,
}

/// Durable ordered list of offline changes, private to one façade instance.
pub struct OfflineQueue {
  db: Arc<Database>,
}

impl OfflineQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Append a change; returns its queue id.
  pub fn append(&self, change: &OfflineChange) -> Result<i64> {
    let payload = match &change.payload {
      Some(p) => Some(
        serde_json::to_vec(p).map_err(|e| eyre!("Failed to serialize queued payload: {}", e))?,
      ),
      None => None,
    };

    let conn = self.db.lock()?;
    conn
      .execute(
        "INSERT INTO offline_queue (op, table_name, cache_key, target_id, payload, queued_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          change.op.as_str(),
          change.table,
          change.cache_key,
          change.target_id,
          payload,
          change.queued_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to queue offline change: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All queued changes in enqueue order.
  pub fn all(&self) -> Result<Vec<QueuedChange>> {
    let conn = self.db.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, op, table_name, cache_key, target_id, payload, queued_at
         FROM offline_queue ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
          row.get::<_, Option<String>>(4)?,
          row.get::<_, Option<Vec<u8>>>(5)?,
          row.get::<_, String>(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read offline queue: {}", e))?;

    let mut changes = Vec::new();
    for row in rows {
      let (id, op, table, cache_key, target_id, payload, queued_at) =
        row.map_err(|e| eyre!("Failed to read queue row: {}", e))?;

      let payload = match payload {
        Some(bytes) => Some(
          serde_json::from_slice(&bytes)
            .map_err(|e| eyre!("Failed to parse queued payload: {}", e))?,
        ),
        None => None,
      };

      changes.push(QueuedChange {
        id,
        change: OfflineChange {
          op: ChangeOp::parse(&op)?,
          table,
          cache_key,
          target_id,
          payload,
          queued_at: DateTime::parse_from_rfc3339(&queued_at)
            .map_err(|e| eyre!("Failed to parse queued_at: {}", e))?
            .with_timezone(&Utc),
        },
      });
    }

    Ok(changes)
  }

  /// Remove one entry by queue id.
  pub fn remove(&self, id: i64) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM offline_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queue entry {}: {}", id, e))?;
    Ok(())
  }

  /// Drop every queued change.
  pub fn clear(&self) -> Result<()> {
    let conn = self.db.lock()?;
    conn
      .execute("DELETE FROM offline_queue", [])
      .map_err(|e| eyre!("Failed to clear offline queue: {}", e))?;
    Ok(())
  }

  pub fn len(&self) -> Result<usize> {
    let conn = self.db.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM offline_queue", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count offline queue: {}", e))?;
    Ok(count as usize)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn queue() -> OfflineQueue {
    OfflineQueue::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn change(op: ChangeOp, id: Option<&str>) -> OfflineChange {
    OfflineChange {
      op,
      table: "channels".to_string(),
      cache_key: "loadChannels".to_string(),
      target_id: id.map(String::from),
      payload: Some(json!({"name": "News 24"})),
      queued_at: Utc::now(),
    }
  }

  #[test]
  fn test_append_and_readback_in_order() {
    let queue = queue();
    queue.append(&change(ChangeOp::Update, Some("5"))).unwrap();
    queue.append(&change(ChangeOp::Delete, Some("5"))).unwrap();

    let entries = queue.all().unwrap();
    assert_eq!(entries.len(), 2);
    // Both survive, in enqueue order; no dedup for the same entity
    assert_eq!(entries[0].change.op, ChangeOp::Update);
    assert_eq!(entries[1].change.op, ChangeOp::Delete);
    assert_eq!(entries[0].change.target_id.as_deref(), Some("5"));
  }

  #[test]
  fn test_payload_roundtrip() {
    let queue = queue();
    queue.append(&change(ChangeOp::Create, None)).unwrap();

    let entries = queue.all().unwrap();
    assert_eq!(entries[0].change.payload, Some(json!({"name": "News 24"})));
    assert_eq!(entries[0].change.cache_key, "loadChannels");
  }

  #[test]
  fn test_remove_and_clear() {
    let queue = queue();
    let first = queue.append(&change(ChangeOp::Create, None)).unwrap();
    queue.append(&change(ChangeOp::Create, None)).unwrap();

    queue.remove(first).unwrap();
    assert_eq!(queue.len().unwrap(), 1);

    queue.clear().unwrap();
    assert!(queue.is_empty().unwrap());
  }
}
