//! The offline worker: lifecycle, fetch routing, background sync, push and page messages.
//!
//! [`Worker`] exposes one method per event the host delivers. Handlers never log on their
//! own behalf beyond diagnostics; they return structured outcomes for the host adapter.

mod host;
mod message;
mod push;
mod route;

pub use host::Host;
pub use message::{ClientMessage, MessageOutcome};
pub use push::{Notification, CLOSE_ACTION, EXPLORE_ACTION};
pub use route::{classify, Route};

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use reqwest::Method;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, Served, SqliteStorage};
use crate::config::WorkerConfig;
use crate::db::Database;
use crate::http::{Network, Request, Response};
use crate::sync::{self, SqliteSyncQueue, SyncReport, SyncTag};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, no lifecycle event handled yet
  Parsed,
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  /// Intercepting fetches
  Activated,
  /// Failed install; this instance never activates
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallReport {
  pub partition: String,
  pub cached: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivateReport {
  /// Partitions of previous cache generations that were removed
  pub deleted: Vec<String>,
  pub claimed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
  Closed,
  Opened(Url),
}

/// One worker instance bound to a cache generation.
pub struct Worker<N: Network, H: Host> {
  config: Arc<WorkerConfig>,
  layer: CacheLayer<SqliteStorage, N>,
  queue: SqliteSyncQueue,
  host: H,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl<N: Network, H: Host> Worker<N, H> {
  pub fn new(config: Arc<WorkerConfig>, db: &Database, network: N, host: H) -> Self {
    let layer = CacheLayer::new(
      Arc::new(db.cache_storage()),
      Arc::new(network),
      Arc::clone(&config),
    );

    Self {
      config,
      layer,
      queue: db.sync_queue(),
      host,
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub fn storage(&self) -> &SqliteStorage {
    self.layer.storage()
  }

  pub fn queue(&self) -> &SqliteSyncQueue {
    &self.queue
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  /// Move to `to` if the current state is one of `from`, checked and set under one lock.
  /// Returns the state that was left.
  fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<WorkerState> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let current = *state;
    if !from.contains(&current) {
      return Err(eyre!("Cannot move worker from {} to {}", current, to));
    }
    *state = to;
    Ok(current)
  }

  /// Whether skip-waiting was requested by install or by a page.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Pick up a generation installed by an earlier run of this process.
  ///
  /// Returns true when the static partition for this version already exists, in which case
  /// the worker is `installed` and only needs activating.
  pub fn resume(&self) -> Result<bool> {
    if !self
      .storage()
      .has_partition(&self.config.partitions.static_assets)?
    {
      return Ok(false);
    }
    Ok(
      self
        .transition(&[WorkerState::Parsed], WorkerState::Installed)
        .is_ok(),
    )
  }

  /// Prime the static partition with the app shell.
  ///
  /// All-or-nothing: if any manifest URL cannot be fetched or answers with an error status,
  /// nothing is written and the worker becomes redundant. The offline page is primed after
  /// the manifest and never fails the install.
  pub async fn on_install(&self) -> Result<InstallReport> {
    self.transition(&[WorkerState::Parsed], WorkerState::Installing)?;
    info!(version = %self.config.version, "Installing");

    match self.precache().await {
      Ok(report) => {
        self.set_state(WorkerState::Installed);
        self.request_skip_waiting().await?;
        Ok(report)
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        Err(eyre!("Install of {} failed: {}", self.config.version, e))
      }
    }
  }

  async fn precache(&self) -> Result<InstallReport> {
    let urls = self.config.precache_urls()?;
    let network = self.layer.network();

    let fetches = urls.iter().map(|url| async move {
      let response = network.fetch(&Request::get(url.clone())).await?;
      if !response.is_ok() {
        return Err(eyre!("{} answered {}", url, response.status));
      }
      Ok::<_, color_eyre::Report>((url.clone(), response))
    });
    let entries: Vec<(Url, Response)> = try_join_all(fetches).await?;

    let partition = &self.config.partitions.static_assets;
    self.storage().put_all(partition, &entries)?;

    let mut cached: Vec<String> = urls.iter().map(Url::to_string).collect();
    if !urls.contains(&self.config.offline_page) && self.prime_offline_page().await {
      cached.push(self.config.offline_page.to_string());
    }

    Ok(InstallReport {
      partition: partition.clone(),
      cached,
    })
  }

  async fn prime_offline_page(&self) -> bool {
    let url = &self.config.offline_page;
    let result = match self.layer.network().fetch(&Request::get(url.clone())).await {
      Ok(response) if response.is_ok() => {
        self
          .storage()
          .put(&self.config.partitions.static_assets, url, &response)
      }
      Ok(response) => Err(eyre!("{} answered {}", url, response.status)),
      Err(e) => Err(e),
    };

    match result {
      Ok(()) => true,
      Err(e) => {
        warn!(%url, "Offline page not cached: {}", e);
        false
      }
    }
  }

  /// Drop partitions of other cache generations and claim open pages.
  ///
  /// Safe to run more than once; afterwards exactly the three current partitions exist.
  pub async fn on_activate(&self) -> Result<ActivateReport> {
    let previous = self.transition(
      &[WorkerState::Installed, WorkerState::Activated],
      WorkerState::Activating,
    )?;
    info!(version = %self.config.version, "Activating");

    let cleanup = async { self.delete_stale_partitions() };
    let (deleted, claimed) = futures::join!(cleanup, self.host.claim_clients());

    match (deleted, claimed) {
      (Ok(deleted), Ok(claimed)) => {
        self.set_state(WorkerState::Activated);
        Ok(ActivateReport { deleted, claimed })
      }
      (Err(e), _) | (_, Err(e)) => {
        self.set_state(previous);
        Err(eyre!("Activation of {} failed: {}", self.config.version, e))
      }
    }
  }

  fn delete_stale_partitions(&self) -> Result<Vec<String>> {
    let storage = self.storage();
    let mut deleted = Vec::new();

    for name in storage.partitions()? {
      if !self.config.partitions.contains(&name) {
        info!(partition = %name, "Deleting old cache");
        storage.delete_partition(&name)?;
        deleted.push(name);
      }
    }

    for name in self.config.partitions.all() {
      storage.open_partition(name)?;
    }

    Ok(deleted)
  }

  /// Intercept a page request.
  ///
  /// Returns `None` when the worker does not handle it (not active, or not a `GET`); the
  /// host then performs the request itself.
  pub async fn on_fetch(&self, request: &Request) -> Option<Served> {
    if request.method != Method::GET {
      debug!(method = %request.method, url = %request.url, "Not intercepting");
      return None;
    }
    if self.state() != WorkerState::Activated {
      debug!(state = %self.state(), url = %request.url, "Worker not active, not intercepting");
      return None;
    }

    let route = classify(&self.config, request);
    debug!(url = %request.url, ?route, "Routing request");

    let served = match route {
      Route::Static => self.layer.static_cache_first(request).await,
      Route::Image => self.layer.image_cache_first(request).await,
      Route::Api => self.layer.api_network_first(request).await,
      Route::Dynamic => self.layer.dynamic_network_first(request).await,
    };
    Some(served)
  }

  /// Replay the queue for `tag`. Unknown tags are ignored (`Ok(None)`).
  pub async fn on_sync(&self, tag: &str) -> Result<Option<SyncReport>> {
    let tag: SyncTag = match tag.parse() {
      Ok(tag) => tag,
      Err(_) => {
        debug!(tag, "Ignoring unknown sync tag");
        return Ok(None);
      }
    };

    let endpoint = self.config.sync_endpoint(tag);
    let report = sync::replay(&self.queue, self.layer.network(), tag, endpoint).await?;
    Ok(Some(report))
  }

  /// Show a notification for an incoming push.
  pub async fn on_push(&self, data: Option<&[u8]>) -> Result<Notification> {
    let notification = Notification::for_push(&self.config.notification, data, Utc::now());
    self.host.show_notification(&notification).await?;
    Ok(notification)
  }

  pub async fn on_notification_click(&self, action: Option<&str>) -> Result<ClickOutcome> {
    self
      .host
      .close_notification(&self.config.notification.title)
      .await?;

    match action {
      Some(EXPLORE_ACTION) => {
        let url = self.config.notification_open_url.clone();
        self.host.open_window(&url).await?;
        Ok(ClickOutcome::Opened(url))
      }
      Some(CLOSE_ACTION) | None => Ok(ClickOutcome::Closed),
      Some(other) => {
        debug!(action = other, "Unknown notification action, treated as close");
        Ok(ClickOutcome::Closed)
      }
    }
  }

  pub async fn on_message(&self, payload: &serde_json::Value) -> Result<MessageOutcome> {
    match ClientMessage::parse(payload) {
      ClientMessage::SkipWaiting => {
        self.request_skip_waiting().await?;
        Ok(MessageOutcome::SkipWaiting)
      }
      ClientMessage::CacheUrls { urls } => Ok(self.cache_urls(&urls).await),
      ClientMessage::QueueSync { tag, item } => {
        let tag: SyncTag = tag.parse()?;
        let id = self.queue.enqueue(tag, &item)?;
        Ok(MessageOutcome::Queued { tag, id })
      }
      ClientMessage::Unknown => {
        debug!(%payload, "Ignoring unrecognized message");
        Ok(MessageOutcome::Ignored)
      }
    }
  }

  /// Fetch every URL concurrently into the dynamic partition. One failure does not affect
  /// the others.
  async fn cache_urls(&self, urls: &[String]) -> MessageOutcome {
    let results = join_all(urls.iter().map(|raw| async move {
      let result = match self.config.resolve(raw) {
        Ok(url) => self.layer.prewarm(&url).await.map(|_| ()),
        Err(e) => Err(e),
      };
      (raw.clone(), result)
    }))
    .await;

    let mut cached = Vec::new();
    let mut failed = Vec::new();
    for (url, result) in results {
      match result {
        Ok(()) => cached.push(url),
        Err(e) => failed.push((url, e.to_string())),
      }
    }
    MessageOutcome::CachedUrls { cached, failed }
  }

  async fn request_skip_waiting(&self) -> Result<()> {
    self.skip_waiting.store(true, Ordering::SeqCst);
    self.host.skip_waiting().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ResponseSource;
  use crate::testutil::{response_with, test_config, FakeNetwork, HostEvent, RecordingHost};
  use reqwest::StatusCode;
  use serde_json::json;

  type TestWorker = Worker<Arc<FakeNetwork>, Arc<RecordingHost>>;

  struct Fixture {
    db: Database,
    network: Arc<FakeNetwork>,
    host: Arc<RecordingHost>,
  }

  impl Fixture {
    fn new() -> Self {
      Self {
        db: Database::open_in_memory().unwrap(),
        network: Arc::new(FakeNetwork::new()),
        host: Arc::new(RecordingHost::new()),
      }
    }

    fn worker(&self, version: &str) -> TestWorker {
      Worker::new(
        test_config(version),
        &self.db,
        Arc::clone(&self.network),
        Arc::clone(&self.host),
      )
    }

    fn serve_manifest(&self, config: &WorkerConfig) {
      for url in config.precache_urls().unwrap() {
        let body = format!("shell {}", url.path());
        self.network.respond(&url, Response::text(StatusCode::OK, &body));
      }
    }

    fn serve_shell(&self, config: &WorkerConfig) {
      self.serve_manifest(config);
      self.network.respond(
        &config.offline_page,
        Response::text(StatusCode::OK, "shell /offline.html"),
      );
    }

    async fn active_worker(&self, version: &str) -> TestWorker {
      let worker = self.worker(version);
      self.serve_shell(worker.config());
      worker.on_install().await.unwrap();
      worker.on_activate().await.unwrap();
      worker
    }
  }

  fn partitions(worker: &TestWorker) -> Vec<String> {
    let mut names = worker.storage().partitions().unwrap();
    names.sort();
    names
  }

  #[tokio::test]
  async fn test_install_primes_static_partition() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    f.serve_shell(worker.config());

    let report = worker.on_install().await.unwrap();

    assert_eq!(report.partition, "v1-static");
    assert_eq!(report.cached.len(), 11);
    assert_eq!(worker.storage().entries("v1-static").unwrap().len(), 11);
    assert_eq!(worker.state(), WorkerState::Installed);
    assert!(worker.skip_waiting_requested());
    assert_eq!(f.host.events(), vec![HostEvent::SkipWaiting]);
  }

  #[tokio::test]
  async fn test_install_succeeds_without_offline_page() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    f.serve_manifest(worker.config());

    let report = worker.on_install().await.unwrap();
    assert_eq!(report.cached.len(), 10);
    assert_eq!(worker.state(), WorkerState::Installed);
    assert!(worker
      .storage()
      .match_url(&worker.config().offline_page)
      .unwrap()
      .is_none());

    worker.on_activate().await.unwrap();
    f.network.set_offline(true);
    let navigation = Request::get(worker.config().resolve("/progress").unwrap())
      .with_header("accept", "text/html")
      .unwrap();
    let served = worker.on_fetch(&navigation).await.unwrap();
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(served.response.body_text(), "Offline");
  }

  #[tokio::test]
  async fn test_concurrent_installs_run_once() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    f.serve_shell(worker.config());

    let (a, b) = tokio::join!(worker.on_install(), worker.on_install());
    assert!(a.is_ok() != b.is_ok());
    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(f.host.events(), vec![HostEvent::SkipWaiting]);

    let manifest = worker.config().resolve("/manifest.json").unwrap();
    assert_eq!(f.network.calls_to(&manifest), 1);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    f.serve_shell(worker.config());
    f.network.respond(
      &worker.config().resolve("/icons/icon-384x384.png").unwrap(),
      Response::text(StatusCode::NOT_FOUND, "missing"),
    );

    assert!(worker.on_install().await.is_err());
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(!worker.storage().has_partition("v1-static").unwrap());
    assert!(worker.on_activate().await.is_err());
    assert!(f.host.events().is_empty());
  }

  #[tokio::test]
  async fn test_failed_install_keeps_previous_generation() {
    let f = Fixture::new();
    let old = f.active_worker("v1").await;

    let new = f.worker("v2");
    f.network.set_offline(true);
    assert!(new.on_install().await.is_err());

    assert_eq!(
      partitions(&old),
      vec!["v1-dynamic", "v1-images", "v1-static"]
    );
  }

  #[tokio::test]
  async fn test_activate_twice_is_idempotent() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;

    let again = worker.on_activate().await.unwrap();
    assert!(again.deleted.is_empty());
    assert_eq!(worker.state(), WorkerState::Activated);
    assert_eq!(
      partitions(&worker),
      vec!["v1-dynamic", "v1-images", "v1-static"]
    );
  }

  #[tokio::test]
  async fn test_activate_before_install_is_rejected() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    assert!(worker.on_activate().await.is_err());
    assert_eq!(worker.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_version_bump_replaces_partitions() {
    let f = Fixture::new();
    let old = f.active_worker("faceyoga-ai-plus-v1").await;
    old
      .storage()
      .put(
        "faceyoga-ai-plus-v1-images",
        &old.config().resolve("/img/a.png").unwrap(),
        &Response::text(StatusCode::OK, "a"),
      )
      .unwrap();
    old.storage().open_partition("unrelated-cache").unwrap();

    let new = f.active_worker("faceyoga-ai-plus-v2").await;

    assert_eq!(
      partitions(&new),
      vec![
        "faceyoga-ai-plus-v2-dynamic",
        "faceyoga-ai-plus-v2-images",
        "faceyoga-ai-plus-v2-static",
      ]
    );
  }

  #[tokio::test]
  async fn test_resume_picks_up_installed_generation() {
    let f = Fixture::new();
    f.active_worker("v1").await;

    let restarted = f.worker("v1");
    assert!(restarted.resume().unwrap());
    assert_eq!(restarted.state(), WorkerState::Installed);
    restarted.on_activate().await.unwrap();

    let fresh = f.worker("v2");
    assert!(!fresh.resume().unwrap());
    assert_eq!(fresh.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_fetch_not_intercepted_until_active() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    let request = Request::get(worker.config().resolve("/").unwrap());
    assert!(worker.on_fetch(&request).await.is_none());
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;
    let url = worker.config().resolve("/api/exercise/sync").unwrap();
    f.network.respond(&url, Response::text(StatusCode::OK, "ok"));

    let request = Request::post_json(url, &json!({"id": "a"}));
    assert!(worker.on_fetch(&request).await.is_none());
    assert!(worker.storage().entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_shell_served_from_cache_after_install() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;
    let url = worker.config().resolve("/manifest.json").unwrap();
    let calls_after_install = f.network.calls_to(&url);

    let served = worker.on_fetch(&Request::get(url.clone())).await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body_text(), "shell /manifest.json");
    assert_eq!(f.network.calls_to(&url), calls_after_install);
  }

  #[tokio::test]
  async fn test_offline_navigation_serves_precached_offline_page() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;
    f.network.set_offline(true);

    let request = Request::get(worker.config().resolve("/progress").unwrap())
      .with_header("accept", "text/html")
      .unwrap();
    let served = worker.on_fetch(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.body_text(), "shell /offline.html");
  }

  #[tokio::test]
  async fn test_concurrent_fetches_of_same_url_both_succeed() {
    let f = Fixture::new();
    let worker = Arc::new(f.active_worker("v1").await);
    let url = worker.config().resolve("/img/pose.png").unwrap();
    f.network.respond(
      &url,
      response_with(StatusCode::OK, &[("content-type", "image/png")], b"pose"),
    );

    let a = {
      let worker = Arc::clone(&worker);
      let url = url.clone();
      tokio::spawn(async move { worker.on_fetch(&Request::get(url)).await })
    };
    let b = {
      let worker = Arc::clone(&worker);
      let url = url.clone();
      tokio::spawn(async move { worker.on_fetch(&Request::get(url)).await })
    };

    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.response.body_text(), "pose");
    assert_eq!(b.response.body_text(), "pose");
    assert_eq!(worker.storage().entries("v1-images").unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_cache_urls_message_prewarms_dynamic() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;
    let a = worker.config().resolve("/a").unwrap();
    let b = worker.config().resolve("/b").unwrap();
    f.network.respond(&a, Response::text(StatusCode::OK, "A"));
    f.network.respond(&b, Response::text(StatusCode::OK, "B"));

    let outcome = worker
      .on_message(&json!({"type": "CACHE_URLS", "urls": ["/a", "/b"]}))
      .await
      .unwrap();

    assert_eq!(
      outcome,
      MessageOutcome::CachedUrls {
        cached: vec!["/a".to_string(), "/b".to_string()],
        failed: vec![],
      }
    );
    assert_eq!(f.network.calls_to(&a), 1);
    assert_eq!(f.network.calls_to(&b), 1);
    assert_eq!(
      worker.storage().entries("v1-dynamic").unwrap(),
      vec![a.to_string(), b.to_string()]
    );
  }

  #[tokio::test]
  async fn test_cache_urls_reports_failures_individually() {
    let f = Fixture::new();
    let worker = f.active_worker("v1").await;
    let ok = worker.config().resolve("/ok").unwrap();
    f.network.respond(&ok, Response::text(StatusCode::OK, "fine"));

    let outcome = worker
      .on_message(&json!({"type": "CACHE_URLS", "urls": ["/ok", "/down"]}))
      .await
      .unwrap();

    match outcome {
      MessageOutcome::CachedUrls { cached, failed } => {
        assert_eq!(cached, vec!["/ok"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "/down");
      }
      other => panic!("unexpected outcome {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_skip_waiting_message() {
    let f = Fixture::new();
    let worker = f.worker("v1");

    let outcome = worker
      .on_message(&json!({"type": "SKIP_WAITING"}))
      .await
      .unwrap();

    assert_eq!(outcome, MessageOutcome::SkipWaiting);
    assert!(worker.skip_waiting_requested());
    assert_eq!(f.host.events(), vec![HostEvent::SkipWaiting]);
  }

  #[tokio::test]
  async fn test_unknown_message_is_ignored() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    let outcome = worker.on_message(&json!({"type": "PING"})).await.unwrap();
    assert_eq!(outcome, MessageOutcome::Ignored);
    assert!(f.host.events().is_empty());
  }

  #[tokio::test]
  async fn test_queued_items_replayed_on_sync() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    let endpoint = worker.config().sync_endpoint(SyncTag::ExerciseData).clone();

    for id in ["e1", "e2", "e3"] {
      let outcome = worker
        .on_message(&json!({
          "type": "QUEUE_SYNC",
          "tag": "sync-exercise-data",
          "item": {"id": id, "exercise": "jaw-release"}
        }))
        .await
        .unwrap();
      assert_eq!(
        outcome,
        MessageOutcome::Queued {
          tag: SyncTag::ExerciseData,
          id: id.to_string()
        }
      );
    }

    f.network.respond_with(&endpoint, |request| {
      let body: serde_json::Value = serde_json::from_slice(request.body.as_deref()?).ok()?;
      (body["id"] != "e2").then(|| Response::text(StatusCode::CREATED, ""))
    });

    let report = worker.on_sync("sync-exercise-data").await.unwrap().unwrap();
    assert_eq!(report.synced, vec!["e1", "e3"]);
    assert_eq!(report.failed[0].0, "e2");

    let left = worker.queue().list(SyncTag::ExerciseData).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "e2");
  }

  #[tokio::test]
  async fn test_queue_sync_rejects_unknown_tag_and_missing_id() {
    let f = Fixture::new();
    let worker = f.worker("v1");

    assert!(worker
      .on_message(&json!({"type": "QUEUE_SYNC", "tag": "sync-nope", "item": {"id": 1}}))
      .await
      .is_err());
    assert!(worker
      .on_message(&json!({"type": "QUEUE_SYNC", "tag": "sync-progress-data", "item": {}}))
      .await
      .is_err());
    assert_eq!(worker.queue().len(SyncTag::ProgressData).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unknown_sync_tag_is_ignored() {
    let f = Fixture::new();
    let worker = f.worker("v1");
    assert!(worker.on_sync("sync-calendar").await.unwrap().is_none());
    assert!(f.network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let f = Fixture::new();
    let worker = f.worker("v1");

    let notification = worker.on_push(Some(b"Tu sesion empieza".as_slice())).await.unwrap();
    assert_eq!(notification.body, "Tu sesion empieza");
    assert_eq!(f.host.events(), vec![HostEvent::Show(notification)]);
  }

  #[tokio::test]
  async fn test_explore_click_opens_app() {
    let f = Fixture::new();
    let worker = f.worker("v1");

    let outcome = worker
      .on_notification_click(Some(EXPLORE_ACTION))
      .await
      .unwrap();
    assert_eq!(
      outcome,
      ClickOutcome::Opened(Url::parse("https://faceyoga-ai.app").unwrap())
    );
    assert_eq!(
      f.host.events(),
      vec![
        HostEvent::Close("FaceYoga AI+".to_string()),
        HostEvent::Open("https://faceyoga-ai.app/".to_string()),
      ]
    );
  }

  #[tokio::test]
  async fn test_close_click_only_closes() {
    let f = Fixture::new();
    let worker = f.worker("v1");

    for action in [Some(CLOSE_ACTION), None] {
      let outcome = worker.on_notification_click(action).await.unwrap();
      assert_eq!(outcome, ClickOutcome::Closed);
    }
    assert!(f
      .host
      .events()
      .iter()
      .all(|e| matches!(e, HostEvent::Close(_))));
  }
}
