//! Cache bucket storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

use crate::db::Database;

use super::request::{RequestKey, Response};

/// A response stored in a bucket.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  /// When the response was captured
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache bucket backends.
pub trait CacheStorage: Send + Sync {
  /// Create the bucket if it does not exist yet, recording the cache
  /// name it was opened under.
  fn open_bucket(&self, bucket: &str, cache_name: &str) -> Result<()>;

  fn has_bucket(&self, bucket: &str) -> Result<bool>;

  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Buckets opened under `cache_name`, whatever their version.
  fn buckets_for(&self, cache_name: &str) -> Result<Vec<String>>;

  /// Delete a bucket and its entries. Returns whether it existed.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Store all entries, or none of them.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Look up the response stored for a request identity.
  fn match_request(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  fn entry_count(&self, bucket: &str) -> Result<usize>;
}

/// SQLite-based bucket storage.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn open_bucket(&self, bucket: &str, cache_name: &str) -> Result<()> {
    let conn = self.db.conn()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_buckets (name, cache_name) VALUES (?, ?)",
        params![bucket, cache_name],
      )
      .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    Ok(())
  }

  fn has_bucket(&self, bucket: &str) -> Result<bool> {
    let conn = self.db.conn()?;

    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM cache_buckets WHERE name = ?",
        params![bucket],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up bucket {}: {}", bucket, e))?;

    Ok(found.is_some())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn buckets_for(&self, cache_name: &str) -> Result<Vec<String>> {
    let conn = self.db.conn()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets WHERE cache_name = ? ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map(params![cache_name], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets of {}: {}", cache_name, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", bucket, e))?;
    let removed = tx
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    // Dropping the transaction without commit rolls everything back
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    for (key, response) in entries {
      let headers = serde_json::to_string(&response.headers)
        .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries
           (bucket, entry_key, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          key.cache_hash(),
          key.as_str(),
          response.status,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key.as_str(), e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_request(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM cache_entries
         WHERE bucket = ? AND entry_key = ?",
        params![bucket, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.as_str(), e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedEntry {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn entry_count(&self, bucket: &str) -> Result<usize> {
    let conn = self.db.conn()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", bucket, e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
