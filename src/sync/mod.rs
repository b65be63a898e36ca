//! Offline-first data access: caching reads, deferring writes, replaying
//! the deferred queue when connectivity returns.

mod queue;
mod service;
mod snapshot;
mod tables;

pub use queue::{ChangeOp, OfflineChange, OfflineQueue, QueuedChange};
pub use service::{ReadResult, ReadSource, SyncService, WriteOutcome};
pub use snapshot::{Snapshot, SnapshotStore};

use serde::{Deserialize, Serialize};

/// What to do when a queued mutation fails during the reconnect drain.
///
/// The historical behavior is `SkipAndLog`, which risks silently dropping a
/// mutation the remote rejects; `Halt` keeps the failed entry and the rest
/// of the queue for the next online transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayFailurePolicy {
  #[default]
  SkipAndLog,
  Halt,
}
