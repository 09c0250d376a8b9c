pub const SCHEMA: &str = r#"
-- Captured responses, one row per request identity per bucket
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    -- JSON array of [name, [bytes...]] pairs, values kept as raw bytes
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, entry_key)
);

-- Known buckets, so an opened but empty bucket still exists.
-- cache_name is the unversioned name the bucket was opened under.
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    cache_name TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cookies (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Upgrade for tables created before buckets recorded their cache name.
pub const ADD_BUCKET_CACHE_NAME: &str = r#"
ALTER TABLE cache_buckets ADD COLUMN cache_name TEXT;
DELETE FROM cache_entries;
"#;
