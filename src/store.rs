//! Client state persisted between runs.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::api::CourseRef;

const SESSION_TOKEN: &str = "session_token";
const LAST_COURSE: &str = "last_course";

/// Small key-value store in SQLite.
///
/// Holds the session token and the last selected course. Read once at
/// startup, written on login, logout and course switch.
pub struct StateStore {
  conn: Mutex<Connection>,
}

impl StateStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory state: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run state migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("omniwise").join("state.db"))
  }

  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM client_state WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO client_state (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM client_state WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;

    Ok(())
  }

  pub fn session_token(&self) -> Result<Option<String>> {
    self.get(SESSION_TOKEN)
  }

  pub fn set_session_token(&self, token: &str) -> Result<()> {
    self.set(SESSION_TOKEN, token)
  }

  /// Forget the session and the course picked during it.
  pub fn clear_session(&self) -> Result<()> {
    self.remove(SESSION_TOKEN)?;
    self.remove(LAST_COURSE)
  }

  /// Last selected course. An unreadable record counts as none.
  pub fn last_course(&self) -> Result<Option<CourseRef>> {
    Ok(
      self
        .get(LAST_COURSE)?
        .and_then(|raw| serde_json::from_str(&raw).ok()),
    )
  }

  pub fn set_last_course(&self, course: &CourseRef) -> Result<()> {
    let raw =
      serde_json::to_string(course).map_err(|e| eyre!("Failed to encode course: {}", e))?;
    self.set(LAST_COURSE, &raw)
  }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS client_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
  use super::*;

  fn course(id: u64) -> CourseRef {
    CourseRef {
      id,
      name: format!("Course {}", id),
    }
  }

  #[test]
  fn test_empty_store() {
    let store = StateStore::open_in_memory().unwrap();
    assert_eq!(store.session_token().unwrap(), None);
    assert_eq!(store.last_course().unwrap(), None);
  }

  #[test]
  fn test_token_overwrite() {
    let store = StateStore::open_in_memory().unwrap();
    store.set_session_token("first").unwrap();
    store.set_session_token("second").unwrap();
    assert_eq!(store.session_token().unwrap().as_deref(), Some("second"));
  }

  #[test]
  fn test_last_course() {
    let store = StateStore::open_in_memory().unwrap();
    store.set_last_course(&course(4)).unwrap();
    assert_eq!(store.last_course().unwrap(), Some(course(4)));
  }

  #[test]
  fn test_logout_clears_everything() {
    let store = StateStore::open_in_memory().unwrap();
    store.set_session_token("abc").unwrap();
    store.set_last_course(&course(1)).unwrap();

    store.clear_session().unwrap();

    assert_eq!(store.session_token().unwrap(), None);
    assert_eq!(store.last_course().unwrap(), None);
  }

  #[test]
  fn test_corrupt_course_reads_as_none() {
    let store = StateStore::open_in_memory().unwrap();
    store.set(LAST_COURSE, "{not json").unwrap();
    assert_eq!(store.last_course().unwrap(), None);
  }

  #[test]
  fn test_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("omniwise-store-{}", std::process::id()));
    let path = dir.join("state.db");

    {
      let store = StateStore::open_at(&path).unwrap();
      store.set_session_token("kept").unwrap();
    }
    let store = StateStore::open_at(&path).unwrap();
    assert_eq!(store.session_token().unwrap().as_deref(), Some("kept"));

    let _ = std::fs::remove_dir_all(&dir);
  }
}
