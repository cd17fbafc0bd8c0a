//! Core types for the caching system.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::Response;

/// Normalized cache identity of a `GET` for `url`: the fragment never takes part in matching.
pub fn normalized_url(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

/// Stable, fixed-length storage key for a `GET` of `url`.
pub fn request_key(url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(b"GET ");
  hasher.update(normalized_url(url).as_bytes());
  hex::encode(hasher.finalize())
}

/// A response read back from a partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// Partition the entry was found in
  pub partition: String,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}

/// Response handed back to the page, with metadata about where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
    }
  }

  /// Cached copy served because the network could not be reached.
  pub fn offline(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::CacheStale,
    }
  }

  pub fn fallback(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Fallback,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// From a partition, without touching the network
  Cache,
  /// From a partition after the network attempt failed
  CacheStale,
  /// Offline page or synthesized response
  Fallback,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResponseSource::Network => write!(f, "network"),
      ResponseSource::Cache => write!(f, "cache"),
      ResponseSource::CacheStale => write!(f, "cache (offline)"),
      ResponseSource::Fallback => write!(f, "fallback"),
    }
  }
}
