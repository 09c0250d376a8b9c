//! Cookie jar abstraction and its implementations.

use color_eyre::eyre::eyre;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::Database;
use crate::error::SessionError;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Trait for cookie storage backends.
pub trait CookieStore: Send + Sync {
  fn get(&self, name: &str) -> Result<Option<String>, SessionError>;

  fn set(&self, name: &str, value: &str) -> Result<(), SessionError>;

  /// Remove a cookie. Removing an absent cookie is not an error.
  fn remove(&self, name: &str) -> Result<(), SessionError>;
}

/// Cookies kept in process memory only.
#[derive(Default)]
pub struct MemoryCookies {
  jar: Mutex<HashMap<String, String>>,
}

impl MemoryCookies {
  pub fn new() -> Self {
    Self::default()
  }

  fn jar(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, SessionError> {
    self
      .jar
      .lock()
      .map_err(|e| SessionError::storage(eyre!("Lock poisoned: {}", e)))
  }
}

impl CookieStore for MemoryCookies {
  fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
    Ok(self.jar()?.get(name).cloned())
  }

  fn set(&self, name: &str, value: &str) -> Result<(), SessionError> {
    self.jar()?.insert(name.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, name: &str) -> Result<(), SessionError> {
    self.jar()?.remove(name);
    Ok(())
  }
}

/// Cookies persisted in the application database.
pub struct SqliteCookies {
  db: Arc<Database>,
}

impl SqliteCookies {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CookieStore for SqliteCookies {
  fn get(&self, name: &str) -> Result<Option<String>, SessionError> {
    let conn = self.db.conn().map_err(SessionError::storage)?;

    conn
      .query_row(
        "SELECT value FROM cookies WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| SessionError::storage(eyre!("Failed to read cookie {}: {}", name, e)))
  }

  fn set(&self, name: &str, value: &str) -> Result<(), SessionError> {
    let conn = self.db.conn().map_err(SessionError::storage)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cookies (name, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![name, value],
      )
      .map_err(|e| SessionError::storage(eyre!("Failed to store cookie {}: {}", name, e)))?;

    Ok(())
  }

  fn remove(&self, name: &str) -> Result<(), SessionError> {
    let conn = self.db.conn().map_err(SessionError::storage)?;

    conn
      .execute("DELETE FROM cookies WHERE name = ?", params![name])
      .map_err(|e| SessionError::storage(eyre!("Failed to remove cookie {}: {}", name, e)))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn CookieStore) {
    assert_eq!(store.get(SESSION_COOKIE).unwrap(), None);

    store.set(SESSION_COOKIE, "first").unwrap();
    store.set(SESSION_COOKIE, "second").unwrap();
    assert_eq!(store.get(SESSION_COOKIE).unwrap().as_deref(), Some("second"));

    store.remove(SESSION_COOKIE).unwrap();
    assert_eq!(store.get(SESSION_COOKIE).unwrap(), None);

    // Removing twice is fine
    store.remove(SESSION_COOKIE).unwrap();
  }

  #[test]
  fn test_memory_cookies() {
    exercise(&MemoryCookies::new());
  }

  #[test]
  fn test_sqlite_cookies() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    exercise(&SqliteCookies::new(db));
  }

  #[test]
  fn test_sqlite_cookies_share_database() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    SqliteCookies::new(Arc::clone(&db))
      .set(SESSION_COOKIE, "token")
      .unwrap();

    let other = SqliteCookies::new(db);
    assert_eq!(other.get(SESSION_COOKIE).unwrap().as_deref(), Some("token"));
  }
}
