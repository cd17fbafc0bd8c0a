//! Request and response values exchanged between pages, the worker and the network.

mod client;

pub use client::HttpNetwork;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, DATE};
use reqwest::{Method, StatusCode};
use std::future::Future;
use std::sync::Arc;
use url::Url;

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Build a `POST` carrying `body` as JSON.
  pub fn post_json(url: Url, body: &serde_json::Value) -> Self {
    let mut request = Self::new(Method::POST, url);
    request
      .headers
      .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    request.body = Some(body.to_string().into_bytes());
    request
  }

  /// Add a header, rejecting names or values that are not valid HTTP.
  pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| eyre!("Invalid header name '{}': {}", name, e))?;
    let value =
      HeaderValue::from_str(value).map_err(|e| eyre!("Invalid header value '{}': {}", value, e))?;
    self.headers.insert(name, value);
    Ok(self)
  }

  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// Whether the `Accept` header mentions `media` (substring match, like the browser checks).
  pub fn accepts(&self, media: &str) -> bool {
    header_str(&self.headers, ACCEPT.as_str()).is_some_and(|accept| accept.contains(media))
  }
}

/// A response, either from the network, from a cache partition, or synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Synthetic plain-text response.
  pub fn text(status: StatusCode, body: &str) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(
      CONTENT_TYPE,
      HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Self::new(status, headers, body.as_bytes().to_vec())
  }

  /// Synthetic JSON response.
  pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Self::new(status, headers, value.to_string().into_bytes())
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    self.status.is_success()
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    header_str(&self.headers, name)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header(CONTENT_TYPE.as_str())
  }

  /// The origin's `date` header, if present and parseable.
  pub fn date(&self) -> Option<DateTime<Utc>> {
    self
      .header(DATE.as_str())
      .and_then(|value| DateTime::parse_from_rfc2822(value.trim()).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }

  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|value| value.to_str().ok())
}

/// Upstream network used by the worker.
///
/// An `Err` means the request never produced a response (connectivity, DNS, TLS...).
/// Any response, whatever its status, is `Ok`.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<N: Network> Network for Arc<N> {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    (**self).fetch(request)
  }
}
