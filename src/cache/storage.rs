//! Cache storage trait and SQLite implementation.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Database;
use crate::http::{RequestKey, Response};

/// Trait for cache storage backends.
///
/// Every method is a single atomic operation at the storage layer.
pub trait CacheStorage: Send + Sync {
  /// Create `namespace` if it does not exist yet.
  fn open_namespace(&self, namespace: &str) -> Result<()>;

  /// Look up the entry stored under `key`.
  fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<Response>>;

  /// Store `response` under `key`, replacing any previous entry wholesale.
  fn put(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store all entries or none of them.
  fn put_all(&self, namespace: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Remove one entry. Returns whether it existed.
  fn delete(&self, namespace: &str, key: &RequestKey) -> Result<bool>;

  /// Remove a namespace and everything in it. Returns whether it existed.
  fn delete_namespace(&self, namespace: &str) -> Result<bool>;

  /// Names of all namespaces, oldest first.
  fn list_namespaces(&self) -> Result<Vec<String>>;
}

/// SQLite-based cache storage implementation.
///
/// Also backs the pending-write queue and the worker lifecycle record, so a
/// single database file holds all durable state.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  /// In-memory storage for tests.
  #[cfg(test)]
  pub fn in_memory() -> Self {
    Self::new(Database::open_in_memory().unwrap())
  }

  /// Lock the shared connection.
  pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn insert_namespace(conn: &Connection, namespace: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO namespaces (name) VALUES (?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to open namespace {}: {}", namespace, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  namespace: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (namespace, method, url, status, status_text, headers, body)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        namespace,
        key.method(),
        key.url(),
        response.status,
        response.status_text,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", key, namespace, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_namespace(&self, namespace: &str) -> Result<()> {
    let conn = self.lock()?;
    insert_namespace(&conn, namespace)
  }

  fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<Response>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, status_text, headers, body FROM cache_entries
         WHERE namespace = ? AND method = ? AND url = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, String, Vec<u8>)> = stmt
      .query_row(params![namespace, key.method(), key.url()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key, namespace, e))?;

    match row {
      Some((status, status_text, headers, body)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
        Ok(Some(Response {
          status,
          status_text,
          headers,
          body,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, namespace: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_namespace(&tx, namespace)?;
    insert_entry(&tx, namespace, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn put_all(&self, namespace: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_namespace(&tx, namespace)?;
    for (key, response) in entries {
      insert_entry(&tx, namespace, key, response)?;
    }

    // Dropping an uncommitted transaction rolls it back
    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn delete(&self, namespace: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE namespace = ? AND method = ? AND url = ?",
        params![namespace, key.method(), key.url()],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, namespace, e))?;

    Ok(removed > 0)
  }

  fn delete_namespace(&self, namespace: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE namespace = ?",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", namespace, e))?;

    let removed = tx
      .execute("DELETE FROM namespaces WHERE name = ?", params![namespace])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", namespace, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM namespaces ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace name: {}", e))?;

    Ok(names)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::origin;
  use crate::http::Request;

  fn key(path: &str) -> RequestKey {
    Request::get(path, &origin()).unwrap().key()
  }

  #[test]
  fn test_put_then_get_returns_identical_response() {
    let storage = SqliteStorage::in_memory();
    let response = Response::new(200, "application/json", r#"[{"id":"INC-1"}]"#)
      .with_header("x-request-id", "abc");

    storage.put("api", &key("/api/incidents"), &response).unwrap();

    let cached = storage.get("api", &key("/api/incidents")).unwrap();
    assert_eq!(cached, Some(response));
  }

  #[test]
  fn test_get_is_scoped_to_namespace() {
    let storage = SqliteStorage::in_memory();
    storage
      .put("static", &key("/"), &Response::new(200, "text/html", "<html>"))
      .unwrap();

    assert!(storage.get("api", &key("/")).unwrap().is_none());
    assert!(storage.get("static", &key("/")).unwrap().is_some());
  }

  #[test]
  fn test_put_replaces_entry_wholesale() {
    let storage = SqliteStorage::in_memory();
    let first = Response::new(200, "text/plain", "one").with_header("x-old", "1");
    let second = Response::new(200, "text/plain", "two");

    storage.put("ns", &key("/a"), &first).unwrap();
    storage.put("ns", &key("/a"), &second).unwrap();

    let cached = storage.get("ns", &key("/a")).unwrap().unwrap();
    assert_eq!(cached, second);
    assert!(cached.header("x-old").is_none());
  }

  #[test]
  fn test_delete_reports_presence() {
    let storage = SqliteStorage::in_memory();
    storage
      .put("ns", &key("/a"), &Response::new(200, "text/plain", "a"))
      .unwrap();

    assert!(storage.delete("ns", &key("/a")).unwrap());
    assert!(!storage.delete("ns", &key("/a")).unwrap());
  }

  #[test]
  fn test_delete_namespace_removes_entries() {
    let storage = SqliteStorage::in_memory();
    storage
      .put("old", &key("/a"), &Response::new(200, "text/plain", "a"))
      .unwrap();
    storage.open_namespace("current").unwrap();

    assert!(storage.delete_namespace("old").unwrap());
    assert!(!storage.delete_namespace("old").unwrap());
    assert_eq!(storage.list_namespaces().unwrap(), vec!["current"]);

    // Reopening starts empty
    storage.open_namespace("old").unwrap();
    assert!(storage.get("old", &key("/a")).unwrap().is_none());
  }

  #[test]
  fn test_list_namespaces_in_creation_order() {
    let storage = SqliteStorage::in_memory();
    storage.open_namespace("b").unwrap();
    storage.open_namespace("a").unwrap();
    storage.open_namespace("b").unwrap();

    assert_eq!(storage.list_namespaces().unwrap(), vec!["b", "a"]);
  }

  #[test]
  fn test_put_all_creates_namespace_with_every_entry() {
    let storage = SqliteStorage::in_memory();
    let entries = vec![
      (key("/"), Response::new(200, "text/html", "<html>")),
      (key("/manifest.json"), Response::new(200, "application/json", "{}")),
    ];

    storage.put_all("static", &entries).unwrap();

    assert_eq!(storage.list_namespaces().unwrap(), vec!["static"]);
    for (k, response) in &entries {
      assert_eq!(storage.get("static", k).unwrap().as_ref(), Some(response));
    }
  }
}
