pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Database holding cache buckets and the cookie jar
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at the default location
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Get the default database path
  fn default_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("shell.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

    // Databases from before buckets recorded their cache name also stored
    // header values as strings; their entries cannot be read back.
    if !has_column(&conn, "cache_buckets", "cache_name")? {
      conn
        .execute_batch(schema::ADD_BUCKET_CACHE_NAME)
        .map_err(|e| eyre!("Failed to upgrade cache tables: {}", e))?;
    }

    Ok(())
  }

  /// Lock the connection
  pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
  let mut stmt = conn
    .prepare(&format!("PRAGMA table_info({})", table))
    .map_err(|e| eyre!("Failed to inspect {}: {}", table, e))?;

  let names = stmt
    .query_map([], |row| row.get::<_, String>(1))
    .map_err(|e| eyre!("Failed to inspect {}: {}", table, e))?
    .collect::<rusqlite::Result<Vec<String>>>()
    .map_err(|e| eyre!("Failed to inspect {}: {}", table, e))?;

  Ok(names.iter().any(|n| n == column))
}

/// Application data directory (`<data_dir>/gravitalia`)
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("gravitalia"))
}
