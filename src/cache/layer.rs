//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::storage::CacheStorage;
use super::traits::{CachedResponse, Served};
use crate::config::{ImageAgeSource, WorkerConfig};
use crate::http::{Network, Request, Response};

/// Cache layer that manages the per-resource caching strategies.
///
/// This layer sits between intercepted requests and the network, reading and writing the
/// worker's partitions. None of its strategies fail: every path ends in a response, either
/// real or synthesized.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  config: Arc<WorkerConfig>,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>, config: Arc<WorkerConfig>) -> Self {
    Self {
      storage,
      network,
      config,
    }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  /// Cache-first for app-shell and build assets.
  ///
  /// 1. Any partition has it - return it without touching the network
  /// 2. Otherwise fetch, storing 2xx answers in the static partition
  /// 3. Network unreachable - synthetic 503
  pub async fn static_cache_first(&self, request: &Request) -> Served {
    if let Some(cached) = self.lookup(&request.url) {
      return Served::from_cache(cached);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store(&self.config.partitions.static_assets, &request.url, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, "Static request failed: {}", e);
        Served::fallback(Response::text(StatusCode::SERVICE_UNAVAILABLE, "Offline"))
      }
    }
  }

  /// Cache-first with expiry for images.
  ///
  /// A cached copy is only honored while younger than the configured max age. When the
  /// network is unreachable the cached copy is served whatever its age.
  pub async fn image_cache_first(&self, request: &Request) -> Served {
    let cached = self.lookup(&request.url);
    if let Some(cached) = &cached {
      if self.is_fresh_image(cached, Utc::now()) {
        return Served::from_cache(cached.clone());
      }
      debug!(url = %request.url, "Cached image expired, refetching");
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store(&self.config.partitions.images, &request.url, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, "Image request failed: {}", e);
        match cached {
          Some(cached) => Served::offline(cached),
          None => Served::fallback(Response::text(
            StatusCode::NOT_FOUND,
            "Image not available",
          )),
        }
      }
    }
  }

  /// Network-first for API calls. Only successful `GET`s are cached.
  pub async fn api_network_first(&self, request: &Request) -> Served {
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() && request.is_get() {
          self.store(&self.config.partitions.dynamic, &request.url, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, method = %request.method, "API request failed: {}", e);
        if request.is_get() {
          if let Some(cached) = self.lookup(&request.url) {
            return Served::offline(cached);
          }
        }
        Served::fallback(Response::json(
          StatusCode::SERVICE_UNAVAILABLE,
          &serde_json::json!({ "error": "Network error", "offline": true }),
        ))
      }
    }
  }

  /// Network-first for pages and everything else.
  ///
  /// Only HTML and JavaScript answers are cached. HTML navigations that miss both the
  /// network and the cache get the offline page.
  pub async fn dynamic_network_first(&self, request: &Request) -> Served {
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() && is_page_or_script(&response) {
          self.store(&self.config.partitions.dynamic, &request.url, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, "Dynamic request failed: {}", e);
        if let Some(cached) = self.lookup(&request.url) {
          return Served::offline(cached);
        }

        if request.accepts("text/html") {
          if let Some(page) = self.lookup(&self.config.offline_page) {
            return Served::fallback(page.response);
          }
          debug!(url = %self.config.offline_page, "Offline page is not cached");
        }

        Served::fallback(Response::text(StatusCode::SERVICE_UNAVAILABLE, "Offline"))
      }
    }
  }

  /// Fetch `url` and store the answer in the dynamic partition, whatever its status.
  pub async fn prewarm(&self, url: &Url) -> Result<Response> {
    let response = self.network.fetch(&Request::get(url.clone())).await?;
    self
      .storage
      .put(&self.config.partitions.dynamic, url, &response)?;
    Ok(response)
  }

  fn is_fresh_image(&self, cached: &CachedResponse, now: DateTime<Utc>) -> bool {
    let reference = match self.config.image_age_source {
      ImageAgeSource::DateHeader => cached.response.date(),
      ImageAgeSource::StoredAt => Some(cached.stored_at),
    };

    match reference {
      Some(at) => now - at < self.config.image_max_age,
      None => false,
    }
  }

  /// Storage errors degrade to a cache miss.
  fn lookup(&self, url: &Url) -> Option<CachedResponse> {
    match self.storage.match_url(url) {
      Ok(Some(cached)) => {
        debug!(%url, partition = %cached.partition, "Cache hit");
        Some(cached)
      }
      Ok(None) => None,
      Err(e) => {
        warn!(%url, "Cache lookup failed: {}", e);
        None
      }
    }
  }

  /// Storage errors never fail the response being served.
  fn store(&self, partition: &str, url: &Url, response: &Response) {
    if let Err(e) = self.storage.put(partition, url, response) {
      warn!(%url, partition, "Cache write failed: {}", e);
    }
  }
}

fn is_page_or_script(response: &Response) -> bool {
  response
    .content_type()
    .is_some_and(|ct| ct.contains("text/html") || ct.contains("application/javascript"))
}
