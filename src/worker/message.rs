//! Commands pages send to the worker over the message channel.

use serde::Deserialize;
use serde_json::Value;

use crate::sync::SyncTag;

/// A message posted by a page, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Activate now instead of waiting for old clients to go away
  SkipWaiting,
  /// Pre-warm the dynamic partition with these URLs
  CacheUrls { urls: Vec<String> },
  /// Persist an item the page could not submit while offline
  QueueSync { tag: String, item: Value },
  #[serde(other)]
  Unknown,
}

impl ClientMessage {
  /// Anything that is not a recognizable command is `Unknown`.
  pub fn parse(payload: &Value) -> Self {
    ClientMessage::deserialize(payload).unwrap_or(ClientMessage::Unknown)
  }
}

/// What handling a message did.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
  SkipWaiting,
  CachedUrls {
    cached: Vec<String>,
    failed: Vec<(String, String)>,
  },
  Queued {
    tag: SyncTag,
    id: String,
  },
  Ignored,
}
