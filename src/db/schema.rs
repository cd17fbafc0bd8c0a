/// Schema for cache partitions and the background sync queue.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named cache partition; rowid gives creation order
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Cached responses, keyed by the hashed normalized request
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (partition, request_key),
    FOREIGN KEY (partition) REFERENCES partitions(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_request_key ON entries(request_key);

-- Pending mutations waiting for a sync event
CREATE TABLE IF NOT EXISTS sync_queue (
    tag TEXT NOT NULL,
    item_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    -- Bumped on every re-queue so a replay only dequeues what it sent
    revision INTEGER NOT NULL DEFAULT 0,
    queued_at TEXT NOT NULL,
    PRIMARY KEY (tag, item_id)
);
"#;
