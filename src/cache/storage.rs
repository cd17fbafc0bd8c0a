//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

use super::traits::{normalized_url, request_key, CachedResponse};
use crate::http::Response;

/// Trait for cache storage backends.
///
/// A backend holds named partitions of request → response entries. A request key lives in
/// at most one partition: storing it somewhere moves it there.
pub trait CacheStorage: Send + Sync {
  /// Create a partition if it does not exist yet.
  fn open_partition(&self, name: &str) -> Result<()>;

  /// All partition names, oldest first.
  fn partitions(&self) -> Result<Vec<String>>;

  fn has_partition(&self, name: &str) -> Result<bool>;

  /// Delete a partition and all its entries. Returns whether it existed.
  fn delete_partition(&self, name: &str) -> Result<bool>;

  /// Look `url` up across every partition, oldest partition first.
  fn match_url(&self, url: &Url) -> Result<Option<CachedResponse>>;

  /// Store a single response, replacing any previous entry for the same request.
  fn put(&self, partition: &str, url: &Url, response: &Response) -> Result<()>;

  /// Store a batch atomically: either every entry is written or none is.
  fn put_all(&self, partition: &str, entries: &[(Url, Response)]) -> Result<()>;

  /// URLs stored in a partition.
  fn entries(&self, partition: &str) -> Result<Vec<String>>;
}

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
  pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
    Self { conn }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, name)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare partition query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn has_partition(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;

    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM partitions WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up partition {}: {}", name, e))?;

    Ok(found.is_some())
  }

  fn delete_partition(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;

    // Entries go with it through ON DELETE CASCADE
    let deleted = conn
      .execute("DELETE FROM partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;

    Ok(deleted > 0)
  }

  fn match_url(&self, url: &Url) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let key = request_key(url);

    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT e.partition, e.status, e.headers, e.body, e.stored_at
         FROM entries e
         INNER JOIN partitions p ON p.name = e.partition
         WHERE e.request_key = ?
         ORDER BY p.rowid
         LIMIT 1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", url, e))?;

    match row {
      Some((partition, status, headers, body, stored_at)) => {
        let status = StatusCode::from_u16(status)
          .map_err(|e| eyre!("Corrupt status {} cached for {}: {}", status, url, e))?;
        let headers = decode_headers(&headers)?;
        Ok(Some(CachedResponse {
          response: Response::new(status, headers, body),
          partition,
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, url: &Url, response: &Response) -> Result<()> {
    self.put_all(partition, &[(url.clone(), response.clone())])
  }

  fn put_all(&self, partition: &str, entries: &[(Url, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let stored_at = Utc::now().to_rfc3339();

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_partition(&tx, partition)?;

    for (url, response) in entries {
      let key = request_key(url);
      let headers = encode_headers(&response.headers)?;

      // Keep each request in a single partition
      tx.execute(
        "DELETE FROM entries WHERE request_key = ? AND partition != ?",
        params![key, partition],
      )
      .map_err(|e| eyre!("Failed to evict {} from other partitions: {}", url, e))?;

      tx.execute(
        "INSERT OR REPLACE INTO entries (partition, request_key, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          partition,
          key,
          normalized_url(url),
          response.status.as_u16(),
          headers,
          response.body,
          stored_at
        ],
      )
      .map_err(|e| eyre!("Failed to store {}: {}", url, e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entries(&self, partition: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT url FROM entries WHERE partition = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let urls = stmt
      .query_map(params![partition], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry url: {}", e))?;

    Ok(urls)
  }
}

fn ensure_partition(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?, ?)",
      params![name, Utc::now().to_rfc3339()],
    )
    .map_err(|e| eyre!("Failed to open partition {}: {}", name, e))?;
  Ok(())
}

/// Headers are stored as a JSON list of `[name, hex(value)]` pairs, keeping repeated names
/// and non-UTF-8 values byte for byte.
fn encode_headers(headers: &HeaderMap) -> Result<String> {
  let pairs: Vec<(&str, String)> = headers
    .iter()
    .map(|(name, value)| (name.as_str(), hex::encode(value.as_bytes())))
    .collect();

  serde_json::to_string(&pairs).map_err(|e| eyre!("Failed to serialize headers: {}", e))
}

fn decode_headers(json: &str) -> Result<HeaderMap> {
  let pairs: Vec<(String, String)> =
    serde_json::from_str(json).map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  let mut headers = HeaderMap::with_capacity(pairs.len());
  for (name, value) in pairs {
    let bytes =
      hex::decode(&value).map_err(|e| eyre!("Corrupt value cached for header {}: {}", name, e))?;
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| eyre!("Corrupt header name cached: {}", e))?;
    let value = HeaderValue::from_bytes(&bytes)
      .map_err(|e| eyre!("Corrupt value cached for header {}: {}", name, e))?;
    headers.append(name, value);
  }
  Ok(headers)
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
