//! Background sync: durable queue of offline mutations and their replay.

mod queue;

pub use queue::{PendingItem, SqliteSyncQueue};

use color_eyre::{eyre::eyre, Result};
use std::str::FromStr;
use tracing::{debug, warn};
use url::Url;

use crate::http::{Network, Request};

/// Sync tags the worker knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
  ExerciseData,
  ProgressData,
}

impl SyncTag {
  pub const ALL: [SyncTag; 2] = [SyncTag::ExerciseData, SyncTag::ProgressData];

  pub fn as_str(&self) -> &'static str {
    match self {
      SyncTag::ExerciseData => "sync-exercise-data",
      SyncTag::ProgressData => "sync-progress-data",
    }
  }
}

impl FromStr for SyncTag {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    SyncTag::ALL
      .into_iter()
      .find(|tag| tag.as_str() == s)
      .ok_or_else(|| eyre!("Unknown sync tag: {}", s))
  }
}

impl std::fmt::Display for SyncTag {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
  pub tag: SyncTag,
  /// Items replayed and removed from the queue
  pub synced: Vec<String>,
  /// Items still queued, with the reason
  pub failed: Vec<(String, String)>,
}

impl SyncReport {
  fn new(tag: SyncTag) -> Self {
    Self {
      tag,
      synced: Vec::new(),
      failed: Vec::new(),
    }
  }

  pub fn attempted(&self) -> usize {
    self.synced.len() + self.failed.len()
  }
}

/// Replay every item queued under `tag` to `endpoint`, one `POST` per item.
///
/// An item is removed only after a 2xx answer, and only if it was not re-queued while its
/// `POST` was in flight. Failures stay queued for the next run and never stop the remaining
/// items from being attempted.
pub async fn replay<N: Network>(
  queue: &SqliteSyncQueue,
  network: &N,
  tag: SyncTag,
  endpoint: &Url,
) -> Result<SyncReport> {
  let items = queue.list(tag)?;
  let mut report = SyncReport::new(tag);
  debug!(%tag, count = items.len(), "Replaying queued items");

  for item in items {
    let request = Request::post_json(endpoint.clone(), &item.payload);

    match network.fetch(&request).await {
      Ok(response) if response.is_ok() => match queue.remove(tag, &item) {
        Ok(true) => report.synced.push(item.id),
        Ok(false) => {
          debug!(%tag, id = %item.id, "Item changed while syncing, newer payload stays queued");
          report.synced.push(item.id);
        }
        Err(e) => {
          warn!(%tag, id = %item.id, "Synced but could not dequeue: {}", e);
          report
            .failed
            .push((item.id, format!("synced but not dequeued: {}", e)));
        }
      },
      Ok(response) => {
        warn!(%tag, id = %item.id, status = %response.status, "Sync rejected by server");
        report
          .failed
          .push((item.id, format!("server answered {}", response.status)));
      }
      Err(e) => {
        warn!(%tag, id = %item.id, "Failed to sync item: {}", e);
        report.failed.push((item.id, e.to_string()));
      }
    }
  }

  Ok(report)
}
