//! Remote store boundary: a table-scoped CRUD service reached over HTTP.

mod client;
mod types;

pub use client::HttpRemoteStore;
pub use types::{Filter, Order, SelectOptions};

use color_eyre::Result;
use serde_json::Value;

/// The CRUD surface of the remote data store.
///
/// Reads take equality filters, an order specification, and a row limit;
/// writes take a row payload (insert), an id plus partial payload (update),
/// or an id alone (delete). The layer never retries a call; retry, if any,
/// is the remote store's concern.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
  async fn select(&self, table: &str, options: &SelectOptions) -> Result<Vec<Value>>;
  async fn insert(&self, table: &str, row: Value) -> Result<Value>;
  async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Value>;
  async fn delete(&self, table: &str, id: &str) -> Result<()>;
}
