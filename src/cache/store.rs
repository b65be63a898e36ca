//! In-memory TTL cache with bounded size.
//!
//! Entries carry an absolute expiry timestamp and are evicted under pressure
//! by insertion order (oldest first). This approximates LRU using only
//! insertion order — a deliberate simplification; true LRU would track
//! access time instead.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default maximum number of live entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

struct Entry {
  value: Value,
  expires_at: DateTime<Utc>,
  inserted_seq: u64,
}

struct Inner {
  entries: HashMap<String, Entry>,
  next_seq: u64,
}

/// In-memory key/value store with per-entry expiry and a maximum entry count.
///
/// Knows nothing about data semantics; absence is the only failure signal.
pub struct CacheStore {
  inner: Mutex<Inner>,
  max_entries: usize,
}

impl CacheStore {
  /// Create a cache with the default capacity.
  pub fn new() -> Self {
    Self::with_max_entries(DEFAULT_MAX_ENTRIES)
  }

  /// Create a cache holding at most `max_entries` live entries.
  pub fn with_max_entries(max_entries: usize) -> Self {
    Self {
      inner: Mutex::new(Inner {
        entries: HashMap::new(),
        next_seq: 0,
      }),
      max_entries,
    }
  }

  /// Store a value with expiry = now + ttl.
  ///
  /// At capacity, already-expired entries are purged first; if the store is
  /// still full, the single oldest-inserted entry is evicted.
  pub fn set(&self, key: &str, value: Value, ttl: Duration) {
    let now = Utc::now();
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

    if !inner.entries.contains_key(key) && inner.entries.len() >= self.max_entries {
      inner.entries.retain(|_, entry| entry.expires_at > now);

      if inner.entries.len() >= self.max_entries {
        let oldest = inner
          .entries
          .iter()
          .min_by_key(|(_, entry)| entry.inserted_seq)
          .map(|(k, _)| k.clone());
        if let Some(k) = oldest {
          inner.entries.remove(&k);
        }
      }
    }

    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.entries.insert(
      key.to_string(),
      Entry {
        value,
        expires_at: now + ttl,
        inserted_seq: seq,
      },
    );
  }

  /// Get a value, or None if absent or expired.
  ///
  /// An expired entry is deleted as a side effect of being read.
  pub fn get(&self, key: &str) -> Option<Value> {
    let now = Utc::now();
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

    match inner.entries.get(key) {
      Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
      Some(_) => {
        inner.entries.remove(key);
        None
      }
      None => None,
    }
  }

  /// Delete every key containing the given substring.
  ///
  /// Deliberately blunt: callers invalidate by operation name without
  /// knowing every parameter combination cached under it. Idempotent.
  pub fn invalidate(&self, pattern: &str) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.retain(|key, _| !key.contains(pattern));
  }

  /// Drop everything unconditionally.
  pub fn clear(&self) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.clear();
  }

  /// Number of stored entries (expired entries may linger until touched).
  pub fn len(&self) -> usize {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new()
  }
}

/// Build a deterministic cache key from an operation name and its params.
///
/// Object keys are sorted lexicographically (recursively) before
/// serialization, so the same params in different insertion order always
/// produce the same key. Keys stay human-readable because invalidation
/// matches on key content.
pub fn generate_key(operation: &str, params: &Value) -> String {
  format!("{}:{}", operation, canonical(params))
}

/// Serialize a value with all object keys sorted.
fn canonical(value: &Value) -> String {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      let fields: Vec<String> = keys
        .into_iter()
        .map(|k| {
          format!(
            "{}:{}",
            serde_json::to_string(k).unwrap_or_default(),
            canonical(&map[k])
          )
        })
        .collect();
      format!("{{{}}}", fields.join(","))
    }
    Value::Array(items) => {
      let items: Vec<String> = items.iter().map(canonical).collect();
      format!("[{}]", items.join(","))
    }
    other => serde_json::to_string(other).unwrap_or_default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_key_ignores_param_order() {
    let a = json!({"table": "channels", "limit": 10, "order": "name"});
    let mut b = serde_json::Map::new();
    b.insert("order".to_string(), json!("name"));
    b.insert("limit".to_string(), json!(10));
    b.insert("table".to_string(), json!("channels"));

    assert_eq!(
      generate_key("loadChannels", &a),
      generate_key("loadChannels", &Value::Object(b))
    );
  }

  #[test]
  fn test_key_distinguishes_params() {
    let a = generate_key("loadChannels", &json!({"limit": 10}));
    let b = generate_key("loadChannels", &json!({"limit": 20}));
    assert_ne!(a, b);
  }

  #[test]
  fn test_get_live_entry() {
    let cache = CacheStore::new();
    cache.set("k", json!(42), Duration::minutes(5));
    assert_eq!(cache.get("k"), Some(json!(42)));
  }

  #[test]
  fn test_expired_entry_is_removed_on_read() {
    let cache = CacheStore::new();
    // expiry == now, so the entry is already dead
    cache.set("k", json!(42), Duration::zero());
    assert_eq!(cache.get("k"), None);
    assert_eq!(cache.len(), 0);
  }

  #[test]
  fn test_overwrite_refreshes_value() {
    let cache = CacheStore::new();
    cache.set("k", json!(1), Duration::minutes(5));
    cache.set("k", json!(2), Duration::minutes(5));
    assert_eq!(cache.get("k"), Some(json!(2)));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_eviction_by_insertion_order() {
    let cache = CacheStore::with_max_entries(2);
    cache.set("a", json!(1), Duration::minutes(5));
    cache.set("b", json!(2), Duration::minutes(5));
    cache.set("c", json!(3), Duration::minutes(5));

    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get("b"), Some(json!(2)));
    assert_eq!(cache.get("c"), Some(json!(3)));
  }

  #[test]
  fn test_expired_entries_purged_before_eviction() {
    let cache = CacheStore::with_max_entries(2);
    cache.set("dead", json!(0), Duration::zero());
    cache.set("live", json!(1), Duration::minutes(5));
    cache.set("new", json!(2), Duration::minutes(5));

    // The expired entry made room; the live one survives
    assert_eq!(cache.get("live"), Some(json!(1)));
    assert_eq!(cache.get("new"), Some(json!(2)));
  }

  #[test]
  fn test_invalidate_by_substring() {
    let cache = CacheStore::new();
    cache.set("loadChannels:{}", json!(1), Duration::minutes(5));
    cache.set("loadChannels:{\"limit\":10}", json!(2), Duration::minutes(5));
    cache.set("loadArticles:{}", json!(3), Duration::minutes(5));

    cache.invalidate("loadChannels");
    assert_eq!(cache.get("loadChannels:{}"), None);
    assert_eq!(cache.get("loadChannels:{\"limit\":10}"), None);
    assert_eq!(cache.get("loadArticles:{}"), Some(json!(3)));
  }

  #[test]
  fn test_invalidate_is_idempotent() {
    let cache = CacheStore::new();
    cache.set("loadChannels:{}", json!(1), Duration::minutes(5));
    cache.set("loadArticles:{}", json!(2), Duration::minutes(5));

    cache.invalidate("loadChannels");
    let after_first = cache.len();
    cache.invalidate("loadChannels");
    assert_eq!(cache.len(), after_first);
  }

  #[test]
  fn test_clear() {
    let cache = CacheStore::new();
    cache.set("a", json!(1), Duration::minutes(5));
    cache.set("b", json!(2), Duration::minutes(5));
    cache.clear();
    assert!(cache.is_empty());
  }
}
