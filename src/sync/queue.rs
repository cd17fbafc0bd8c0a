//! Durable queue of pending sync items.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

use super::SyncTag;

/// A mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
  pub id: String,
  pub payload: Value,
  /// Incremented each time the item is re-queued
  pub revision: i64,
  pub queued_at: DateTime<Utc>,
}

/// Extract the identifier a queued item is dequeued by.
///
/// Accepts a string or an integer `id` field.
pub fn item_id(item: &Value) -> Result<String> {
  match item.get("id") {
    Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
    Some(Value::Number(id)) => Ok(id.to_string()),
    _ => Err(eyre!("Sync item needs a non-empty string or numeric 'id' field")),
  }
}

/// SQLite-backed sync queue, one logical queue per tag.
#[derive(Clone)]
pub struct SqliteSyncQueue {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteSyncQueue {
  pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
    Self { conn }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Queue `item` under `tag`. Re-queueing an id replaces its payload and bumps its revision
  /// but keeps its place.
  pub fn enqueue(&self, tag: SyncTag, item: &Value) -> Result<String> {
    let id = item_id(item)?;
    let payload =
      serde_json::to_string(item).map_err(|e| eyre!("Failed to serialize sync item: {}", e))?;
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT INTO sync_queue (tag, item_id, payload, queued_at) VALUES (?, ?, ?, ?)
         ON CONFLICT (tag, item_id) DO UPDATE
         SET payload = excluded.payload, revision = sync_queue.revision + 1",
        params![tag.as_str(), id, payload, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to queue sync item {}: {}", id, e))?;

    Ok(id)
  }

  /// Items queued under `tag`, oldest first.
  pub fn list(&self, tag: SyncTag) -> Result<Vec<PendingItem>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT item_id, payload, revision, queued_at FROM sync_queue
         WHERE tag = ?
         ORDER BY rowid",
      )
      .map_err(|e| eyre!("Failed to prepare sync queue query: {}", e))?;

    let rows = stmt
      .query_map(params![tag.as_str()], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, i64>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read sync queue: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read sync item: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, revision, queued_at)| -> Result<PendingItem> {
        let payload = serde_json::from_str(&payload)
          .map_err(|e| eyre!("Corrupt payload for sync item {}: {}", id, e))?;
        let queued_at = DateTime::parse_from_rfc3339(&queued_at)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| eyre!("Corrupt timestamp for sync item {}: {}", id, e))?;
        Ok(PendingItem {
          id,
          payload,
          revision,
          queued_at,
        })
      })
      .collect()
  }

  /// Remove an item after it has been replayed.
  ///
  /// Only the revision that was sent is removed: returns false when the item is gone or was
  /// re-queued since it was listed, in which case the newer payload stays queued.
  pub fn remove(&self, tag: SyncTag, item: &PendingItem) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM sync_queue WHERE tag = ? AND item_id = ? AND revision = ?",
        params![tag.as_str(), item.id, item.revision],
      )
      .map_err(|e| eyre!("Failed to dequeue sync item {}: {}", item.id, e))?;

    Ok(removed > 0)
  }

  pub fn len(&self, tag: SyncTag) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sync_queue WHERE tag = ?",
        params![tag.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count sync queue: {}", e))?;

    Ok(count as usize)
  }
}
