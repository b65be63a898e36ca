//! Client-side data synchronization layer for the portal content dashboard.
//!
//! Four pieces, leaves first: a time-bounded cache with bounded size and
//! pattern-based invalidation, a memoizing wrapper that applies it to any
//! async read, a publish/subscribe bus that propagates domain events within
//! one process and across processes of the same installation, and an
//! offline-first sync façade that queues mutations while offline and
//! replays them on reconnect.
//!
//! The host application constructs the bus and one `SyncService` at startup
//! and passes them by reference to consumers:
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let db = Arc::new(Database::open()?);
//! let bus = Arc::new(EventBus::with_config(
//!     Arc::new(SqliteChannel::new(db.clone())),
//!     &config.bus,
//! ));
//! let remote = HttpRemoteStore::new(&config.remote)?;
//! let service = SyncService::with_database(remote, bus.clone(), config, db)?;
//!
//! let channels = service.channels(&SelectOptions::new().eq("active", true)).await?;
//! match service.update_channel(5, json!({"name": "News 24"})).await? {
//!     WriteOutcome::Completed(row) => { /* applied remotely */ }
//!     WriteOutcome::Deferred => { /* offline; replays on reconnect */ }
//! }
//! ```
//!
//! This layer does not guarantee strong consistency, does not resolve write
//! conflicts, and provides no durability beyond its SQLite storage.

pub mod bus;
pub mod cache;
pub mod config;
pub mod db;
pub mod remote;
pub mod sync;

pub use bus::{DomainEvent, EventBus, EventKind, MemoryChannel, SqliteChannel, StorageChannel};
pub use cache::{generate_key, CacheStore, Memoized};
pub use config::Config;
pub use db::Database;
pub use remote::{Filter, HttpRemoteStore, Order, RemoteStore, SelectOptions};
pub use sync::{
  ChangeOp, OfflineChange, OfflineQueue, ReadResult, ReadSource, ReplayFailurePolicy, Snapshot,
  SnapshotStore, SyncService, WriteOutcome,
};
