//! Time-bounded caching for read operations.
//!
//! Two pieces: a generic TTL store with bounded size and pattern-based
//! invalidation, and a memoizing wrapper that applies it transparently to
//! any asynchronous read operation.

mod memo;
mod store;

pub use memo::Memoized;
pub use store::{generate_key, CacheStore, DEFAULT_MAX_ENTRIES};
