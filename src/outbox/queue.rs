//! Durable queue of writes made while offline.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::SqliteStorage;

/// An incident submission waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
  pub id: String,
  pub payload: Value,
}

impl PendingWrite {
  /// Wrap a payload, reusing its `id` field when it has one.
  pub fn new(payload: Value) -> Self {
    let id = match payload.get("id") {
      Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
      Some(Value::Number(n)) => n.to_string(),
      _ => generate_id(&payload),
    };
    Self { id, payload }
  }
}

/// Content hash of the payload salted with the current time.
fn generate_id(payload: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(payload.to_string().as_bytes());
  hasher.update(
    Utc::now()
      .timestamp_nanos_opt()
      .unwrap_or_default()
      .to_le_bytes(),
  );
  let digest = hex::encode(hasher.finalize());
  format!("pending-{}", &digest[..16])
}

/// Queue storage backing the background sync.
pub trait WriteQueue: Send + Sync {
  /// Append a write. Re-enqueueing an id replaces its payload in place.
  fn enqueue(&self, write: &PendingWrite) -> Result<()>;

  /// All queued writes, oldest first. Nothing is removed.
  fn dequeue_all(&self) -> Result<Vec<PendingWrite>>;

  /// Drop a write once it has been delivered. Returns whether it was queued.
  fn remove(&self, id: &str) -> Result<bool>;
}

impl WriteQueue for SqliteStorage {
  fn enqueue(&self, write: &PendingWrite) -> Result<()> {
    let conn = self.lock()?;
    let payload = serde_json::to_string(&write.payload)
      .map_err(|e| eyre!("Failed to serialize pending write {}: {}", write.id, e))?;

    conn
      .execute(
        "INSERT INTO pending_writes (id, payload) VALUES (?, ?)
         ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
        params![write.id, payload],
      )
      .map_err(|e| eyre!("Failed to queue write {}: {}", write.id, e))?;

    Ok(())
  }

  fn dequeue_all(&self) -> Result<Vec<PendingWrite>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT id, payload FROM pending_writes ORDER BY seq")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })
      .map_err(|e| eyre!("Failed to read pending writes: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read pending write: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload)| {
        let payload = serde_json::from_str(&payload)
          .map_err(|e| eyre!("Failed to deserialize pending write {}: {}", id, e))?;
        Ok(PendingWrite { id, payload })
      })
      .collect()
  }

  fn remove(&self, id: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM pending_writes WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove pending write {}: {}", id, e))?;

    Ok(removed > 0)
  }
}
