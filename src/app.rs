//! Command-line host adapter: turns commands into worker events and logs their outcomes.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, ResponseSource};
use crate::config::{Config, WorkerConfig};
use crate::db::Database;
use crate::http::{HttpNetwork, Network, Request, Response};
use crate::sync::SyncTag;
use crate::worker::{
  ActivateReport, ClickOutcome, Host, InstallReport, MessageOutcome, Notification, Worker,
};
use crate::{Command, QueueCommand};

/// Host services for a command-line run. The only client page is this process.
pub struct CliHost;

impl Host for CliHost {
  async fn skip_waiting(&self) -> Result<()> {
    debug!("Skip waiting requested");
    Ok(())
  }

  async fn claim_clients(&self) -> Result<usize> {
    Ok(1)
  }

  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    let json = serde_json::to_string_pretty(notification)
      .map_err(|e| eyre!("Failed to render notification: {}", e))?;
    println!("{}", json);
    Ok(())
  }

  async fn close_notification(&self, title: &str) -> Result<()> {
    debug!(title, "Notification closed");
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }
}

/// Main application state
pub struct App {
  worker: Worker<HttpNetwork, CliHost>,
  /// Performs requests the worker declines to intercept
  network: HttpNetwork,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let worker_config = Arc::new(WorkerConfig::from_config(config)?);
    let db = Database::open(config.database.as_deref())?;
    let network = HttpNetwork::new()?;
    let worker = Worker::new(worker_config, &db, network.clone(), CliHost);

    Ok(Self { worker, network })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Start => {
        self.install().await?;
        self.activate().await
      }
      Command::Install => self.install().await,
      Command::Activate => {
        if !self.worker.resume()? {
          return Err(eyre!(
            "Cache generation {} is not installed; run `install` first",
            self.worker.config().version
          ));
        }
        self.activate().await
      }
      Command::Fetch {
        url,
        method,
        accept,
        data,
        include,
      } => {
        let request = self.build_request(&url, &method, accept.as_deref(), data)?;
        self.fetch(&request, include).await
      }
      Command::Sync { tag } => self.sync(&tag).await,
      Command::Queue { action } => self.queue(action).await,
      Command::Message { json } => {
        let payload: serde_json::Value =
          serde_json::from_str(&json).map_err(|e| eyre!("Message is not valid JSON: {}", e))?;
        self.message(&payload).await
      }
      Command::Push { text } => {
        let notification = self
          .worker
          .on_push(text.as_deref().map(str::as_bytes))
          .await?;
        info!(body = %notification.body, "Notification shown");
        Ok(())
      }
      Command::Click { action } => {
        match self.worker.on_notification_click(action.as_deref()).await? {
          ClickOutcome::Opened(url) => info!(%url, "Opened app window"),
          ClickOutcome::Closed => info!("Notification dismissed"),
        }
        Ok(())
      }
      Command::Caches { entries } => self.caches(entries),
    }
  }

  async fn install(&self) -> Result<()> {
    let report = self.worker.on_install().await?;
    log_install(&report);
    if self.worker.skip_waiting_requested() {
      debug!("New generation will activate without waiting for old pages");
    }
    Ok(())
  }

  async fn activate(&self) -> Result<()> {
    let report = self.worker.on_activate().await?;
    log_activate(&report);
    Ok(())
  }

  /// Bring the worker to `activated`, installing first if this generation never was.
  async fn ensure_active(&self) -> Result<()> {
    if !self.worker.resume()? {
      self.install().await?;
    }
    self.activate().await
  }

  fn build_request(
    &self,
    url: &str,
    method: &str,
    accept: Option<&str>,
    data: Option<String>,
  ) -> Result<Request> {
    let url = self.worker.config().resolve(url)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

    let mut request = Request::new(method, url);
    if let Some(accept) = accept {
      request = request.with_header("accept", accept)?;
    }
    if let Some(data) = data {
      request = request
        .with_header("content-type", "application/json")?
        .with_body(data.into_bytes());
    }
    Ok(request)
  }

  async fn fetch(&self, request: &Request, include_headers: bool) -> Result<()> {
    self.ensure_active().await?;

    let (response, source) = match self.worker.on_fetch(request).await {
      Some(served) => {
        if served.source == ResponseSource::Fallback {
          warn!(url = %request.url, "Network unreachable, served offline fallback");
        }
        (served.response, served.source.to_string())
      }
      None => (
        self.network.fetch(request).await?,
        "network (not intercepted)".to_string(),
      ),
    };

    info!(url = %request.url, status = %response.status, %source, "Served");
    print_response(&response, include_headers)
  }

  async fn sync(&self, tag: &str) -> Result<()> {
    match self.worker.on_sync(tag).await? {
      Some(report) => {
        info!(
          tag = %report.tag,
          attempted = report.attempted(),
          synced = report.synced.len(),
          remaining = self.worker.queue().len(report.tag)?,
          "Sync finished"
        );
        for (id, reason) in &report.failed {
          warn!(%id, "Still queued: {}", reason);
        }
      }
      None => warn!(tag, "Unknown sync tag, nothing to replay"),
    }
    Ok(())
  }

  async fn queue(&self, action: QueueCommand) -> Result<()> {
    match action {
      QueueCommand::Add { tag, json } => {
        let item: serde_json::Value =
          serde_json::from_str(&json).map_err(|e| eyre!("Item is not valid JSON: {}", e))?;
        let message = serde_json::json!({ "type": "QUEUE_SYNC", "tag": tag, "item": item });
        self.message(&message).await
      }
      QueueCommand::List { tag } => {
        let tags = match tag {
          Some(tag) => vec![tag.parse::<SyncTag>()?],
          None => SyncTag::ALL.to_vec(),
        };
        for tag in tags {
          for item in self.worker.queue().list(tag)? {
            println!(
              "{}\t{}\t{}\t{}",
              tag,
              item.id,
              item.queued_at.to_rfc3339(),
              item.payload
            );
          }
        }
        Ok(())
      }
    }
  }

  async fn message(&self, payload: &serde_json::Value) -> Result<()> {
    match self.worker.on_message(payload).await? {
      MessageOutcome::SkipWaiting => info!("Skip waiting requested"),
      MessageOutcome::CachedUrls { cached, failed } => {
        info!(cached = cached.len(), failed = failed.len(), "Pre-warmed dynamic cache");
        for (url, reason) in &failed {
          warn!(%url, "Not cached: {}", reason);
        }
      }
      MessageOutcome::Queued { tag, id } => info!(%tag, %id, "Queued for background sync"),
      MessageOutcome::Ignored => warn!("Message not recognized, ignored"),
    }
    Ok(())
  }

  fn caches(&self, with_entries: bool) -> Result<()> {
    let storage = self.worker.storage();
    let current = &self.worker.config().partitions;

    for name in storage.partitions()? {
      let entries = storage.entries(&name)?;
      let marker = if current.contains(&name) { "*" } else { " " };
      println!("{} {}\t{} entries", marker, name, entries.len());
      if with_entries {
        for url in entries {
          println!("    {}", url);
        }
      }
    }
    Ok(())
  }
}

fn log_install(report: &InstallReport) {
  info!(
    partition = %report.partition,
    assets = report.cached.len(),
    "Installed"
  );
}

fn log_activate(report: &ActivateReport) {
  for name in &report.deleted {
    info!(partition = %name, "Deleted old cache");
  }
  info!(clients = report.claimed, "Activated");
}

fn print_response(response: &Response, include_headers: bool) -> Result<()> {
  let mut out = std::io::stdout().lock();
  if include_headers {
    writeln!(out, "HTTP {}", response.status)?;
    for (name, value) in &response.headers {
      writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
    }
    writeln!(out)?;
  }
  out.write_all(&response.body)?;
  out.flush()?;
  Ok(())
}
