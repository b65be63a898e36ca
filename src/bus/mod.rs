//! Publish/subscribe bus for domain events.
//!
//! Events are delivered synchronously to subscribers in the same process
//! and eventually to other processes of the same installation: the emitter
//! writes a serialized copy under a well-known durable-storage key and
//! removes it again shortly after, so watchers observe the write as a value
//! transition. The delayed removal is not history — a process restarting
//! inside that window misses the event, an accepted eventual-consistency gap.

pub mod channel;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::BusConfig;

pub use channel::{MemoryChannel, SqliteChannel, StorageChannel};

/// Well-known durable-storage key for the cross-process echo.
pub const CHANNEL_KEY: &str = "portal_sync.event";

/// How long an emitted event stays in durable storage before removal.
pub const DEFAULT_ECHO_TTL: Duration = Duration::from_millis(100);

/// How often the watcher polls the channel for value transitions.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// What happened to a domain entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
  Added,
  Updated,
  Deleted,
  StatusChanged,
}

/// A change notification, carrying the affected entity or its identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
  pub kind: EventKind,
  pub payload: Option<Value>,
  pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
  pub fn new(kind: EventKind, payload: Option<Value>) -> Self {
    Self {
      kind,
      payload,
      timestamp: Utc::now(),
    }
  }
}

/// Wire form written to the channel; the origin id lets a process skip the
/// echo of its own writes, like a storage event that never fires in the
/// originating tab.
#[derive(Serialize, Deserialize)]
struct Envelope {
  origin: Uuid,
  event: DomainEvent,
}

type Callback = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
  subscribers: Mutex<HashMap<u64, Callback>>,
  next_id: AtomicU64,
}

impl Registry {
  fn dispatch(&self, event: &DomainEvent) {
    // Snapshot the callbacks and release the lock before invoking them, so
    // a subscriber may emit, subscribe, or unsubscribe from its callback
    // without deadlocking. A subscriber registered mid-dispatch sees only
    // later events.
    let subscribers: Vec<(u64, Callback)> = {
      let guard = match self.subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
      };
      guard.iter().map(|(id, cb)| (*id, cb.clone())).collect()
    };

    for (id, callback) in subscribers {
      // One failing subscriber must not take down the others
      if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
        error!(subscriber = id, kind = ?event.kind, "Event subscriber panicked");
      }
    }
  }
}

/// Subscription guard; dropping it (or calling `unsubscribe`) deregisters
/// the callback.
pub struct Subscription {
  id: u64,
  registry: Arc<Registry>,
}

impl Subscription {
  pub fn unsubscribe(self) {
    // Drop does the work
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Ok(mut subscribers) = self.registry.subscribers.lock() {
      subscribers.remove(&self.id);
    }
  }
}

/// Publish/subscribe bus with cross-process propagation.
///
/// Construct one at application start and share it by reference; tests
/// build a fresh instance per case over a `MemoryChannel`.
pub struct EventBus {
  registry: Arc<Registry>,
  channel: Arc<dyn StorageChannel>,
  origin: Uuid,
  echo_ttl: Duration,
  watcher: tokio::task::JoinHandle<()>,
}

impl EventBus {
  /// Create a bus over the given channel with default timing.
  ///
  /// Must be called from within a tokio runtime; the bus spawns a watcher
  /// task that polls the channel for other processes' events.
  pub fn new(channel: Arc<dyn StorageChannel>) -> Self {
    Self::with_timing(channel, DEFAULT_ECHO_TTL, DEFAULT_POLL_INTERVAL)
  }

  /// Create a bus with echo/poll timing taken from configuration.
  pub fn with_config(channel: Arc<dyn StorageChannel>, config: &BusConfig) -> Self {
    Self::with_timing(channel, config.echo_ttl(), config.poll_interval())
  }

  /// Create a bus with explicit echo/poll timing.
  pub fn with_timing(
    channel: Arc<dyn StorageChannel>,
    echo_ttl: Duration,
    poll_interval: Duration,
  ) -> Self {
    let registry = Arc::new(Registry::default());
    let origin = Uuid::new_v4();

    let watcher = tokio::spawn(Self::watch(
      channel.clone(),
      registry.clone(),
      origin,
      poll_interval,
    ));

    Self {
      registry,
      channel,
      origin,
      echo_ttl,
      watcher,
    }
  }

  /// Register a callback for every event, local or cross-process.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&DomainEvent) + Send + Sync + 'static,
  {
    let id = self.registry.next_id.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut subscribers) = self.registry.subscribers.lock() {
      subscribers.insert(id, Arc::new(callback));
    }
    Subscription {
      id,
      registry: self.registry.clone(),
    }
  }

  /// Emit an event: synchronous local dispatch, then the durable echo for
  /// other processes.
  ///
  /// Channel failures are logged rather than surfaced; a broken echo path
  /// must not fail the mutation that emitted the event.
  pub fn emit(&self, kind: EventKind, payload: Option<Value>) {
    let event = DomainEvent::new(kind, payload);

    self.registry.dispatch(&event);

    let envelope = Envelope {
      origin: self.origin,
      event,
    };
    let serialized = match serde_json::to_string(&envelope) {
      Ok(s) => s,
      Err(e) => {
        warn!("Failed to serialize event envelope: {}", e);
        return;
      }
    };

    if let Err(e) = self.channel.put(CHANNEL_KEY, &serialized) {
      warn!("Failed to write event to channel: {}", e);
      return;
    }

    // Remove the echo after a short delay; the write-then-delete exists only
    // so other processes observe a value transition
    let channel = self.channel.clone();
    let echo_ttl = self.echo_ttl;
    tokio::spawn(async move {
      tokio::time::sleep(echo_ttl).await;
      if let Err(e) = channel.remove(CHANNEL_KEY) {
        warn!("Failed to clear event channel: {}", e);
      }
    });
  }

  /// Watcher loop: poll for value transitions on the channel key and
  /// dispatch events from other origins.
  async fn watch(
    channel: Arc<dyn StorageChannel>,
    registry: Arc<Registry>,
    origin: Uuid,
    poll_interval: Duration,
  ) {
    let mut last_seen: Option<String> = None;

    loop {
      tokio::time::sleep(poll_interval).await;

      let current = match channel.get(CHANNEL_KEY) {
        Ok(value) => value,
        Err(e) => {
          debug!("Channel poll failed: {}", e);
          continue;
        }
      };

      if current == last_seen {
        continue;
      }

      if let Some(serialized) = &current {
        match serde_json::from_str::<Envelope>(serialized) {
          Ok(envelope) if envelope.origin != origin => {
            registry.dispatch(&envelope.event);
          }
          Ok(_) => {} // our own echo
          Err(e) => warn!("Ignoring malformed event on channel: {}", e),
        }
      }

      last_seen = current;
    }
  }
}

impl Drop for EventBus {
  fn drop(&mut self) {
    self.watcher.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn collector() -> (Arc<Mutex<Vec<DomainEvent>>>, impl Fn(&DomainEvent) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |event: &DomainEvent| {
      sink.lock().unwrap().push(event.clone());
    })
  }

  #[tokio::test]
  async fn test_local_delivery_is_synchronous() {
    let bus = EventBus::new(Arc::new(MemoryChannel::new()));
    let (seen, callback) = collector();
    let _sub = bus.subscribe(callback);

    bus.emit(EventKind::Added, Some(json!({"id": 1})));

    // No await between emit and assert: delivery already happened
    let events = seen.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Added);
    assert_eq!(events[0].payload, Some(json!({"id": 1})));
  }

  #[tokio::test]
  async fn test_unsubscribe_stops_delivery() {
    let bus = EventBus::new(Arc::new(MemoryChannel::new()));
    let (seen, callback) = collector();
    let sub = bus.subscribe(callback);

    bus.emit(EventKind::Updated, None);
    sub.unsubscribe();
    bus.emit(EventKind::Updated, None);

    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_subscriber_may_emit_from_its_callback() {
    let bus = Arc::new(EventBus::new(Arc::new(MemoryChannel::new())));
    let (seen, callback) = collector();
    let _log = bus.subscribe(callback);

    // A surface reacting to a change with a follow-up notification
    let relay = bus.clone();
    let _relay_sub = bus.subscribe(move |event| {
      if event.kind == EventKind::Added {
        relay.emit(EventKind::StatusChanged, event.payload.clone());
      }
    });

    bus.emit(EventKind::Added, Some(json!({"id": 2})));

    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&EventKind::Added));
    assert!(kinds.contains(&EventKind::StatusChanged));
  }

  #[tokio::test]
  async fn test_subscriber_may_unsubscribe_from_its_callback() {
    let bus = EventBus::new(Arc::new(MemoryChannel::new()));
    let (seen, callback) = collector();

    // Deliver once, then drop the subscription from inside the callback
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let slot_inner = slot.clone();
    let sub = bus.subscribe(move |event| {
      callback(event);
      slot_inner.lock().unwrap().take();
    });
    *slot.lock().unwrap() = Some(sub);

    bus.emit(EventKind::Updated, None);
    bus.emit(EventKind::Updated, None);

    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_timing_from_config() {
    let config = BusConfig {
      echo_ttl_ms: 60,
      poll_interval_ms: 10,
    };
    let shared: Arc<MemoryChannel> = Arc::new(MemoryChannel::new());
    let bus = EventBus::with_config(shared.clone(), &config);

    bus.emit(EventKind::Added, None);
    assert!(shared.get(CHANNEL_KEY).unwrap().is_some());

    // Cleared once the configured echo window passes
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(shared.get(CHANNEL_KEY).unwrap(), None);
  }

  #[tokio::test]
  async fn test_panicking_subscriber_is_isolated() {
    let bus = EventBus::new(Arc::new(MemoryChannel::new()));
    let _bad = bus.subscribe(|_event| panic!("subscriber bug"));
    let (seen, callback) = collector();
    let _good = bus.subscribe(callback);

    bus.emit(EventKind::Deleted, Some(json!({"id": 3})));

    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_cross_process_delivery_and_echo_cleanup() {
    let shared: Arc<MemoryChannel> = Arc::new(MemoryChannel::new());
    let echo_ttl = Duration::from_millis(150);
    let poll = Duration::from_millis(10);

    let bus_a = EventBus::with_timing(shared.clone(), echo_ttl, poll);
    let bus_b = EventBus::with_timing(shared.clone(), echo_ttl, poll);

    let (seen_a, callback_a) = collector();
    let _sub_a = bus_a.subscribe(callback_a);
    let (seen_b, callback_b) = collector();
    let _sub_b = bus_b.subscribe(callback_b);

    bus_a.emit(EventKind::Added, Some(json!({"id": 7})));

    // Within the delivery window the other bus sees the event
    tokio::time::sleep(Duration::from_millis(80)).await;
    {
      let events = seen_b.lock().unwrap();
      assert_eq!(events.len(), 1);
      assert_eq!(events[0].kind, EventKind::Added);
      assert_eq!(events[0].payload.as_ref().unwrap()["id"], json!(7));
    }

    // The emitter skips its own echo: local delivery only, exactly once
    assert_eq!(seen_a.lock().unwrap().len(), 1);

    // Shortly after, the channel key is empty again
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(shared.get(CHANNEL_KEY).unwrap(), None);
  }
}
