//! Offline-first sync façade over the remote CRUD store.
//!
//! One instance per running application. Composes the cache store, the
//! durable snapshot/queue storage, and the event bus; tracks connectivity
//! and replays queued mutations when it returns. Reads never surface
//! connectivity errors (stale-but-present data beats an error); writes
//! attempted online propagate their errors unchanged.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventKind};
use crate::cache::{generate_key, CacheStore};
use crate::config::Config;
use crate::db::Database;
use crate::remote::{RemoteStore, SelectOptions};

use super::queue::{ChangeOp, OfflineChange, OfflineQueue};
use super::snapshot::SnapshotStore;
use super::ReplayFailurePolicy;

/// Where a read's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
  /// Live cache entry
  Cache,
  /// Fresh from the remote store
  Remote,
  /// Last-known-good durable snapshot (offline or remote failure)
  Snapshot,
}

/// Result of a read: best-effort rows plus their provenance.
#[derive(Debug, Clone)]
pub struct ReadResult {
  pub rows: Vec<Value>,
  pub source: ReadSource,
}

/// Result of a write. Callers must be able to tell a completed write from
/// one accepted while offline and deferred for replay.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
  /// The remote store applied the write; deletes carry `Value::Null`.
  Completed(Value),
  /// Queued for replay on the next online transition.
  Deferred,
}

impl WriteOutcome {
  pub fn is_deferred(&self) -> bool {
    matches!(self, Self::Deferred)
  }
}

/// The sync façade: get/create/update/delete per logical table, with
/// caching, offline tolerance, and change notification.
pub struct SyncService<R> {
  remote: R,
  cache: Arc<CacheStore>,
  queue: OfflineQueue,
  snapshots: SnapshotStore,
  bus: Arc<EventBus>,
  online: AtomicBool,
  config: Config,
}

impl<R: RemoteStore> SyncService<R> {
  /// Create a service backed by the database at the configured path.
  pub fn new(remote: R, bus: Arc<EventBus>, config: Config) -> Result<Self> {
    let db = Arc::new(match &config.database_path {
      Some(path) => Database::open_at(path)?,
      None => Database::open()?,
    });
    Self::with_database(remote, bus, config, db)
  }

  /// Create a service over an explicit database. Tests use this with an
  /// in-memory database.
  pub fn with_database(
    remote: R,
    bus: Arc<EventBus>,
    config: Config,
    db: Arc<Database>,
  ) -> Result<Self> {
    Ok(Self {
      remote,
      cache: Arc::new(CacheStore::with_max_entries(config.cache.max_entries)),
      queue: OfflineQueue::new(db.clone()),
      snapshots: SnapshotStore::new(db),
      bus,
      online: AtomicBool::new(true),
      config,
    })
  }

  /// Seed the connectivity flag from the host environment at startup.
  pub fn with_initial_connectivity(self, online: bool) -> Self {
    self.online.store(online, Ordering::SeqCst);
    self
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// The shared event bus this façade notifies on.
  pub fn bus(&self) -> &EventBus {
    &self.bus
  }

  /// The offline queue; exposed so the host can surface pending counts.
  pub fn queue(&self) -> &OfflineQueue {
    &self.queue
  }

  /// Host-delivered connectivity transition. Going offline→online drains
  /// the queue once; returns how many changes replayed successfully.
  pub async fn set_online(&self, online: bool) -> Result<usize> {
    let was_online = self.online.swap(online, Ordering::SeqCst);
    if online && !was_online {
      self.sync_offline_changes().await
    } else {
      Ok(0)
    }
  }

  // ==========================================================================
  // Generic table operations
  // ==========================================================================

  /// Read rows for a table, cache-first.
  ///
  /// A live cache entry wins unless the caller forces a refresh. Offline,
  /// or when the remote read fails, the last durable snapshot is served
  /// instead (empty if none exists) — reads never error on connectivity.
  pub async fn get_data(
    &self,
    table: &str,
    cache_key: &str,
    options: &SelectOptions,
  ) -> Result<ReadResult> {
    let params = serde_json::to_value(options)
      .map_err(|e| eyre!("Failed to serialize query options: {}", e))?;
    let key = generate_key(cache_key, &params);

    if !options.force_refresh {
      if let Some(hit) = self.cache.get(&key) {
        let rows = serde_json::from_value(hit)
          .map_err(|e| eyre!("Failed to deserialize cached rows for {}: {}", key, e))?;
        return Ok(ReadResult {
          rows,
          source: ReadSource::Cache,
        });
      }
    }

    if !self.is_online() {
      debug!("Offline, serving snapshot for {}", cache_key);
      return self.snapshot_fallback(cache_key);
    }

    match self.remote.select(table, options).await {
      Ok(rows) => {
        self.cache.set(
          &key,
          Value::Array(rows.clone()),
          self.config.cache.ttl_for(table),
        );
        self.snapshots.save(cache_key, table, &rows)?;
        Ok(ReadResult {
          rows,
          source: ReadSource::Remote,
        })
      }
      Err(e) => {
        warn!("Read from table {} failed, serving snapshot: {}", table, e);
        self.snapshot_fallback(cache_key)
      }
    }
  }

  fn snapshot_fallback(&self, cache_key: &str) -> Result<ReadResult> {
    let rows = self
      .snapshots
      .load(cache_key)?
      .map(|snapshot| snapshot.rows)
      .unwrap_or_default();
    Ok(ReadResult {
      rows,
      source: ReadSource::Snapshot,
    })
  }

  /// Insert a row. Offline, the write is queued and `Deferred` returned;
  /// online, a failure propagates to the caller.
  pub async fn create_data(
    &self,
    table: &str,
    data: Value,
    cache_key: &str,
  ) -> Result<WriteOutcome> {
    if !self.is_online() {
      self.defer(ChangeOp::Create, table, cache_key, None, Some(data.clone()))?;
      self.bus.emit(
        EventKind::Added,
        Some(json!({"table": table, "data": data, "deferred": true})),
      );
      return Ok(WriteOutcome::Deferred);
    }

    let row = self.remote.insert(table, data).await?;
    self.cache.invalidate(cache_key);
    self
      .bus
      .emit(EventKind::Added, Some(json!({"table": table, "row": row})));
    Ok(WriteOutcome::Completed(row))
  }

  /// Update a row by id. Same offline/online contract as `create_data`.
  pub async fn update_data(
    &self,
    table: &str,
    id: &str,
    data: Value,
    cache_key: &str,
  ) -> Result<WriteOutcome> {
    if !self.is_online() {
      self.defer(
        ChangeOp::Update,
        table,
        cache_key,
        Some(id),
        Some(data.clone()),
      )?;
      self.bus.emit(
        EventKind::Updated,
        Some(json!({"table": table, "id": id, "data": data, "deferred": true})),
      );
      return Ok(WriteOutcome::Deferred);
    }

    let row = self.remote.update(table, id, data).await?;
    self.cache.invalidate(cache_key);
    self.bus.emit(
      EventKind::Updated,
      Some(json!({"table": table, "id": id, "row": row})),
    );
    Ok(WriteOutcome::Completed(row))
  }

  /// Delete a row by id. Same offline/online contract as `create_data`.
  pub async fn delete_data(&self, table: &str, id: &str, cache_key: &str) -> Result<WriteOutcome> {
    if !self.is_online() {
      self.defer(ChangeOp::Delete, table, cache_key, Some(id), None)?;
      self.bus.emit(
        EventKind::Deleted,
        Some(json!({"table": table, "id": id, "deferred": true})),
      );
      return Ok(WriteOutcome::Deferred);
    }

    self.remote.delete(table, id).await?;
    self.cache.invalidate(cache_key);
    self
      .bus
      .emit(EventKind::Deleted, Some(json!({"table": table, "id": id})));
    Ok(WriteOutcome::Completed(Value::Null))
  }

  /// Invalidate one cache group, or everything the façade holds.
  pub fn clear_cache(&self, key: Option<&str>) {
    match key {
      Some(k) => self.cache.invalidate(k),
      None => self.cache.clear(),
    }
  }

  // ==========================================================================
  // Offline replay
  // ==========================================================================

  fn defer(
    &self,
    op: ChangeOp,
    table: &str,
    cache_key: &str,
    target_id: Option<&str>,
    payload: Option<Value>,
  ) -> Result<()> {
    let change = OfflineChange {
      op,
      table: table.to_string(),
      cache_key: cache_key.to_string(),
      target_id: target_id.map(String::from),
      payload,
      queued_at: Utc::now(),
    };
    self.queue.append(&change)?;
    debug!("Deferred {:?} on table {} while offline", op, table);
    Ok(())
  }

  /// Drain the offline queue in enqueue order.
  ///
  /// A successful replay discards its entry and invalidates the cache group
  /// it targeted. On failure the configured policy applies: `SkipAndLog`
  /// discards the entry and continues; `Halt` stops and keeps the failed
  /// entry plus the remainder for the next transition.
  pub async fn sync_offline_changes(&self) -> Result<usize> {
    let entries = self.queue.all()?;
    if entries.is_empty() {
      return Ok(0);
    }

    info!("Replaying {} offline changes", entries.len());
    let mut replayed = 0;

    for entry in entries {
      match self.replay(&entry.change).await {
        Ok(()) => {
          self.queue.remove(entry.id)?;
          self.cache.invalidate(&entry.change.cache_key);
          replayed += 1;
        }
        Err(e) => match self.config.replay_failure_policy {
          ReplayFailurePolicy::SkipAndLog => {
            warn!(
              "Dropping failed offline {:?} on table {}: {}",
              entry.change.op, entry.change.table, e
            );
            self.queue.remove(entry.id)?;
          }
          ReplayFailurePolicy::Halt => {
            warn!(
              "Halting offline replay at {:?} on table {}: {}",
              entry.change.op, entry.change.table, e
            );
            break;
          }
        },
      }
    }

    Ok(replayed)
  }

  async fn replay(&self, change: &OfflineChange) -> Result<()> {
    match change.op {
      ChangeOp::Create => {
        let payload = change
          .payload
          .clone()
          .ok_or_else(|| eyre!("Queued create without payload"))?;
        self.remote.insert(&change.table, payload).await?;
      }
      ChangeOp::Update => {
        let id = change
          .target_id
          .as_deref()
          .ok_or_else(|| eyre!("Queued update without target id"))?;
        let payload = change
          .payload
          .clone()
          .ok_or_else(|| eyre!("Queued update without payload"))?;
        self.remote.update(&change.table, id, payload).await?;
      }
      ChangeOp::Delete => {
        let id = change
          .target_id
          .as_deref()
          .ok_or_else(|| eyre!("Queued delete without target id"))?;
        self.remote.delete(&change.table, id).await?;
      }
    }
    Ok(())
  }
}
