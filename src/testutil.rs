//! Scripted network and recording host for unit tests.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::normalized_url;
use crate::config::{Config, WorkerConfig};
use crate::http::{Network, Request, Response};
use crate::worker::{Host, Notification};

pub const TEST_ORIGIN: &str = "https://faceyoga.test";

pub fn test_config(version: &str) -> Arc<WorkerConfig> {
  let config = Config {
    origin: TEST_ORIGIN.to_string(),
    cache_version: version.to_string(),
    ..Config::default()
  };
  Arc::new(WorkerConfig::from_config(&config).unwrap())
}

pub fn response_with(status: StatusCode, headers: &[(&str, &str)], body: &[u8]) -> Response {
  let mut map = HeaderMap::new();
  for (name, value) in headers {
    map.append(
      HeaderName::from_bytes(name.as_bytes()).unwrap(),
      HeaderValue::from_str(value).unwrap(),
    );
  }
  Response::new(status, map, body.to_vec())
}

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(at: DateTime<Utc>) -> String {
  at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

type Responder = Box<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

/// Network answering from a script keyed by URL. Unscripted URLs fail like a dropped
/// connection, as does everything while offline.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Responder>>,
  calls: Mutex<Vec<(Method, String)>>,
  offline: AtomicBool,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &Url, response: Response) {
    self.respond_with(url, move |_| Some(response.clone()));
  }

  /// `None` from the responder simulates a network error.
  pub fn respond_with<F>(&self, url: &Url, responder: F)
  where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
  {
    self
      .routes
      .lock()
      .unwrap()
      .insert(normalized_url(url), Box::new(responder));
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<(Method, String)> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, url: &Url) -> usize {
    let url = normalized_url(url);
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, called)| *called == url)
      .count()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = normalized_url(&request.url);
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.clone(), url.clone()));

    // Let concurrent fetches interleave
    tokio::task::yield_now().await;

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: offline", url));
    }

    let routes = self.routes.lock().unwrap();
    routes
      .get(&url)
      .and_then(|responder| responder(request))
      .ok_or_else(|| eyre!("Failed to fetch {}: connection refused", url))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
  SkipWaiting,
  Claim,
  Show(Notification),
  Close(String),
  Open(String),
}

#[derive(Default)]
pub struct RecordingHost {
  events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<HostEvent> {
    self.events.lock().unwrap().clone()
  }

  fn record(&self, event: HostEvent) {
    self.events.lock().unwrap().push(event);
  }
}

impl Host for RecordingHost {
  async fn skip_waiting(&self) -> Result<()> {
    self.record(HostEvent::SkipWaiting);
    Ok(())
  }

  async fn claim_clients(&self) -> Result<usize> {
    self.record(HostEvent::Claim);
    Ok(1)
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.record(HostEvent::Show(notification.clone()));
    Ok(())
  }

  async fn close_notification(&self, title: &str) -> Result<()> {
    self.record(HostEvent::Close(title.to_string()));
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    self.record(HostEvent::Open(url.to_string()));
    Ok(())
  }
}
