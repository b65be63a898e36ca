//! Per-table convenience surface: thin bindings over the generic
//! operations, each supplying its table name and cache group.

use color_eyre::Result;
use serde_json::{json, Value};

use crate::bus::EventKind;
use crate::remote::{RemoteStore, SelectOptions};

use super::service::{ReadResult, SyncService, WriteOutcome};

const TABLE_CHANNELS: &str = "channels";
const TABLE_ARTICLES: &str = "articles";
const TABLE_GAMES: &str = "games";
const TABLE_ADVERTISEMENTS: &str = "advertisements";
const TABLE_SETTINGS: &str = "settings";

const KEY_CHANNELS: &str = "loadChannels";
const KEY_ARTICLES: &str = "loadArticles";
const KEY_GAMES: &str = "loadGames";
const KEY_ADVERTISEMENTS: &str = "loadAdvertisements";
const KEY_SETTINGS: &str = "loadSettings";

impl<R: RemoteStore> SyncService<R> {
  // ==========================================================================
  // Channels
  // ==========================================================================

  pub async fn channels(&self, options: &SelectOptions) -> Result<ReadResult> {
    self.get_data(TABLE_CHANNELS, KEY_CHANNELS, options).await
  }

  pub async fn create_channel(&self, data: Value) -> Result<WriteOutcome> {
    self.create_data(TABLE_CHANNELS, data, KEY_CHANNELS).await
  }

  pub async fn update_channel(&self, id: u64, data: Value) -> Result<WriteOutcome> {
    self
      .update_data(TABLE_CHANNELS, &id.to_string(), data, KEY_CHANNELS)
      .await
  }

  pub async fn delete_channel(&self, id: u64) -> Result<WriteOutcome> {
    self
      .delete_data(TABLE_CHANNELS, &id.to_string(), KEY_CHANNELS)
      .await
  }

  /// Toggle a channel's active flag. Emits `StatusChanged` on top of the
  /// `Updated` event from the underlying write, so status-indicator
  /// surfaces outside the direct callers observe the change too.
  pub async fn set_channel_status(&self, id: u64, active: bool) -> Result<WriteOutcome> {
    let outcome = self
      .update_data(
        TABLE_CHANNELS,
        &id.to_string(),
        json!({"active": active}),
        KEY_CHANNELS,
      )
      .await?;
    self.bus().emit(
      EventKind::StatusChanged,
      Some(json!({"id": id, "active": active})),
    );
    Ok(outcome)
  }

  // ==========================================================================
  // Articles
  // ==========================================================================

  pub async fn articles(&self, options: &SelectOptions) -> Result<ReadResult> {
    self.get_data(TABLE_ARTICLES, KEY_ARTICLES, options).await
  }

  pub async fn create_article(&self, data: Value) -> Result<WriteOutcome> {
    self.create_data(TABLE_ARTICLES, data, KEY_ARTICLES).await
  }

  pub async fn update_article(&self, id: u64, data: Value) -> Result<WriteOutcome> {
    self
      .update_data(TABLE_ARTICLES, &id.to_string(), data, KEY_ARTICLES)
      .await
  }

  pub async fn delete_article(&self, id: u64) -> Result<WriteOutcome> {
    self
      .delete_data(TABLE_ARTICLES, &id.to_string(), KEY_ARTICLES)
      .await
  }

  // ==========================================================================
  // Games
  // ==========================================================================

  pub async fn games(&self, options: &SelectOptions) -> Result<ReadResult> {
    self.get_data(TABLE_GAMES, KEY_GAMES, options).await
  }

  pub async fn create_game(&self, data: Value) -> Result<WriteOutcome> {
    self.create_data(TABLE_GAMES, data, KEY_GAMES).await
  }

  pub async fn update_game(&self, id: u64, data: Value) -> Result<WriteOutcome> {
    self
      .update_data(TABLE_GAMES, &id.to_string(), data, KEY_GAMES)
      .await
  }

  pub async fn delete_game(&self, id: u64) -> Result<WriteOutcome> {
    self.delete_data(TABLE_GAMES, &id.to_string(), KEY_GAMES).await
  }

  // ==========================================================================
  // Advertisements
  // ==========================================================================

  pub async fn advertisements(&self, options: &SelectOptions) -> Result<ReadResult> {
    self
      .get_data(TABLE_ADVERTISEMENTS, KEY_ADVERTISEMENTS, options)
      .await
  }

  pub async fn create_advertisement(&self, data: Value) -> Result<WriteOutcome> {
    self
      .create_data(TABLE_ADVERTISEMENTS, data, KEY_ADVERTISEMENTS)
      .await
  }

  pub async fn update_advertisement(&self, id: u64, data: Value) -> Result<WriteOutcome> {
    self
      .update_data(TABLE_ADVERTISEMENTS, &id.to_string(), data, KEY_ADVERTISEMENTS)
      .await
  }

  pub async fn delete_advertisement(&self, id: u64) -> Result<WriteOutcome> {
    self
      .delete_data(TABLE_ADVERTISEMENTS, &id.to_string(), KEY_ADVERTISEMENTS)
      .await
  }

  // ==========================================================================
  // Settings
  // ==========================================================================

  pub async fn settings(&self, options: &SelectOptions) -> Result<ReadResult> {
    self.get_data(TABLE_SETTINGS, KEY_SETTINGS, options).await
  }

  pub async fn create_setting(&self, data: Value) -> Result<WriteOutcome> {
    self.create_data(TABLE_SETTINGS, data, KEY_SETTINGS).await
  }

  pub async fn update_setting(&self, id: u64, data: Value) -> Result<WriteOutcome> {
    self
      .update_data(TABLE_SETTINGS, &id.to_string(), data, KEY_SETTINGS)
      .await
  }

  pub async fn delete_setting(&self, id: u64) -> Result<WriteOutcome> {
    self
      .delete_data(TABLE_SETTINGS, &id.to_string(), KEY_SETTINGS)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::super::service::tests::{service, MockRemote};
  use super::*;
  use crate::bus::DomainEvent;
  use std::sync::{Arc, Mutex};

  #[tokio::test]
  async fn test_table_methods_route_to_their_tables() {
    let remote = MockRemote::default();
    let svc = service(remote.clone());

    svc.channels(&SelectOptions::new()).await.unwrap();
    svc.articles(&SelectOptions::new()).await.unwrap();
    svc.advertisements(&SelectOptions::new()).await.unwrap();

    assert_eq!(
      remote.call_log(),
      vec!["select:channels", "select:articles", "select:advertisements"]
    );
  }

  #[tokio::test]
  async fn test_cache_groups_are_independent() {
    let remote = MockRemote::default();
    let svc = service(remote.clone());

    svc.channels(&SelectOptions::new()).await.unwrap();
    svc.games(&SelectOptions::new()).await.unwrap();

    // Mutating articles leaves the channel and game groups cached
    svc.create_article(json!({"title": "launch"})).await.unwrap();
    svc.channels(&SelectOptions::new()).await.unwrap();
    svc.games(&SelectOptions::new()).await.unwrap();

    let selects = remote
      .call_log()
      .iter()
      .filter(|call| call.starts_with("select:"))
      .count();
    assert_eq!(selects, 2);
  }

  #[tokio::test]
  async fn test_set_channel_status_emits_status_changed() {
    let remote = MockRemote::default();
    let svc = service(remote.clone());

    let seen: Arc<Mutex<Vec<DomainEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = svc.bus().subscribe(move |event| {
      sink.lock().unwrap().push(event.clone());
    });

    svc.set_channel_status(5, false).await.unwrap();

    let events = seen.lock().unwrap();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Updated, EventKind::StatusChanged]);
    assert_eq!(
      events[1].payload,
      Some(json!({"id": 5, "active": false}))
    );
  }
}
