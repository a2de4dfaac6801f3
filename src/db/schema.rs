/// Schema for the offline cache database.
pub const SCHEMA: &str = r#"
-- Version-qualified cache namespaces
CREATE TABLE IF NOT EXISTS namespaces (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses, replaced wholesale per key
CREATE TABLE IF NOT EXISTS cache_entries (
    namespace TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    PRIMARY KEY (namespace, method, url)
);

-- Writes waiting for connectivity (seq preserves FIFO order)
CREATE TABLE IF NOT EXISTS pending_writes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Worker lifecycle per deployment version
CREATE TABLE IF NOT EXISTS worker_state (
    version TEXT PRIMARY KEY,
    lifecycle TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
