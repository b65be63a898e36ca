//! Memoizing wrapper that makes any async read operation cache-aware.
//!
//! Wraps a fetcher closure with an operation name and a TTL. Each read
//! operation picks its own TTL based on how volatile its data is; channel
//! catalogs cache longer than advertisement statistics.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::store::{generate_key, CacheStore};

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
type FetcherFn<P, T> = Box<dyn Fn(P) -> BoxFuture<T> + Send + Sync>;

/// A cache-aware view of an async fetch operation.
///
/// The cache key is derived from the operation name plus the normalized
/// params, so the underlying function body never needs to change.
pub struct Memoized<P, T> {
  operation: String,
  ttl: Duration,
  cache: Arc<CacheStore>,
  fetcher: FetcherFn<P, T>,
}

impl<P, T> Memoized<P, T>
where
  P: Serialize,
  T: Serialize + DeserializeOwned,
{
  /// Wrap `fetcher` so its results are cached under `operation` for `ttl`.
  pub fn new<F, Fut>(cache: Arc<CacheStore>, operation: &str, ttl: Duration, fetcher: F) -> Self
  where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    Self {
      operation: operation.to_string(),
      ttl,
      cache,
      fetcher: Box::new(move |params| Box::pin(fetcher(params))),
    }
  }

  /// Call the operation, serving a live cache entry when one exists.
  ///
  /// On a miss the fetcher runs; a successful result is cached before being
  /// returned. A failed fetch propagates and caches nothing, so a transient
  /// error never poisons the cache with a stale "success".
  pub async fn call(&self, params: P) -> Result<T> {
    let params_value = match serde_json::to_value(&params) {
      Ok(Value::Null) => Value::Object(serde_json::Map::new()),
      Ok(v) => v,
      Err(e) => return Err(eyre!("Failed to serialize params: {}", e)),
    };
    let key = generate_key(&self.operation, &params_value);

    if let Some(hit) = self.cache.get(&key) {
      return serde_json::from_value(hit)
        .map_err(|e| eyre!("Failed to deserialize cached value for {}: {}", key, e));
    }

    let result = (self.fetcher)(params).await?;

    let value = serde_json::to_value(&result)
      .map_err(|e| eyre!("Failed to serialize result for {}: {}", key, e))?;
    self.cache.set(&key, value, self.ttl);

    Ok(result)
  }
}
