//! Schema for the sync database.

/// Schema for the offline queue, snapshots, and event channel tables.
pub const SCHEMA: &str = r#"
-- Deferred mutations, replayed in rowid order on reconnect
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    op TEXT NOT NULL,
    table_name TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    target_id TEXT,
    payload BLOB,
    queued_at TEXT NOT NULL
);

-- Last-known-good query results, one row per snapshot key
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_key TEXT PRIMARY KEY,
    table_name TEXT NOT NULL,
    data BLOB NOT NULL,
    saved_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_table ON snapshots(table_name);

-- Cross-process event channel (write-then-delete, never accumulated)
CREATE TABLE IF NOT EXISTS channel_kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
