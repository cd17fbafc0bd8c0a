use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::sync::SyncTag;

/// On-disk configuration. Every field is optional; missing ones take the defaults of the
/// shipped web app.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the worker is registered for; relative paths resolve against it
  pub origin: String,
  /// Cache generation tag; partition names derive from it
  pub cache_version: String,
  /// SQLite database path (default: $XDG_DATA_HOME/faceyoga-sw/cache.db)
  pub database: Option<PathBuf>,
  /// App-shell paths primed on install
  pub static_assets: Vec<String>,
  /// Build output prefix served cache-first
  pub static_prefix: String,
  pub api_prefix: String,
  /// Page served for failed HTML navigations
  pub offline_page: String,
  pub image_max_age_days: u32,
  pub image_age_source: ImageAgeSource,
  pub notification: NotificationConfig,
  pub sync: SyncConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "https://faceyoga-ai.app".to_string(),
      cache_version: "faceyoga-ai-plus-v1".to_string(),
      database: None,
      static_assets: [
        "/",
        "/manifest.json",
        "/icons/icon-72x72.png",
        "/icons/icon-96x96.png",
        "/icons/icon-128x128.png",
        "/icons/icon-144x144.png",
        "/icons/icon-152x152.png",
        "/icons/icon-192x192.png",
        "/icons/icon-384x384.png",
        "/icons/icon-512x512.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      static_prefix: "/_next/static/".to_string(),
      api_prefix: "/api/".to_string(),
      offline_page: "/offline.html".to_string(),
      image_max_age_days: 7,
      image_age_source: ImageAgeSource::default(),
      notification: NotificationConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

/// Where the age of a cached image is measured from.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImageAgeSource {
  /// The origin's `date` response header. Missing or unparseable means stale.
  #[default]
  DateHeader,
  /// The moment the entry was written to the partition
  StoredAt,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push carries no payload
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  /// Opened by the "explore" action
  pub open_url: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "FaceYoga AI+".to_string(),
      default_body: "Nueva notificación de FaceYoga AI+".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-72x72.png".to_string(),
      open_url: "https://faceyoga-ai.app".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub exercise_endpoint: String,
  pub progress_endpoint: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      exercise_endpoint: "/api/exercise/sync".to_string(),
      progress_endpoint: "/api/progress/sync".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./faceyoga-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/faceyoga-sw/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("faceyoga-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("faceyoga-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }
}

/// Names of the three partitions owned by one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
  pub static_assets: String,
  pub dynamic: String,
  pub images: String,
}

impl PartitionNames {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_assets: format!("{}-static", version),
      dynamic: format!("{}-dynamic", version),
      images: format!("{}-images", version),
    }
  }

  pub fn all(&self) -> [&str; 3] {
    [
      self.static_assets.as_str(),
      self.dynamic.as_str(),
      self.images.as_str(),
    ]
  }

  pub fn contains(&self, name: &str) -> bool {
    self.all().contains(&name)
  }
}

/// Immutable settings shared by every handler of one worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub origin: Url,
  pub version: String,
  pub partitions: PartitionNames,
  pub static_assets: Vec<String>,
  pub static_prefix: String,
  pub api_prefix: String,
  pub offline_page: Url,
  pub image_max_age: Duration,
  pub image_age_source: ImageAgeSource,
  pub notification: NotificationConfig,
  pub notification_open_url: Url,
  exercise_endpoint: Url,
  progress_endpoint: Url,
}

impl WorkerConfig {
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
    if config.cache_version.trim().is_empty() {
      return Err(eyre!("cache_version must not be empty"));
    }

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid path '{}' for origin {}: {}", path, origin, e))
    };

    Ok(Self {
      version: config.cache_version.clone(),
      partitions: PartitionNames::for_version(&config.cache_version),
      static_assets: config.static_assets.clone(),
      static_prefix: config.static_prefix.clone(),
      api_prefix: config.api_prefix.clone(),
      offline_page: resolve(&config.offline_page)?,
      image_max_age: Duration::days(i64::from(config.image_max_age_days)),
      image_age_source: config.image_age_source,
      notification: config.notification.clone(),
      notification_open_url: resolve(&config.notification.open_url)?,
      exercise_endpoint: resolve(&config.sync.exercise_endpoint)?,
      progress_endpoint: resolve(&config.sync.progress_endpoint)?,
      origin,
    })
  }

  /// Resolve a page-supplied URL (absolute or origin-relative).
  pub fn resolve(&self, url: &str) -> Result<Url> {
    self
      .origin
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  /// App-shell URLs that must all be primed for an install to succeed.
  pub fn precache_urls(&self) -> Result<Vec<Url>> {
    let mut urls = Vec::with_capacity(self.static_assets.len());
    for path in &self.static_assets {
      let url = self.resolve(path)?;
      if !urls.contains(&url) {
        urls.push(url);
      }
    }
    Ok(urls)
  }

  pub fn sync_endpoint(&self, tag: SyncTag) -> &Url {
    match tag {
      SyncTag::ExerciseData => &self.exercise_endpoint,
      SyncTag::ProgressData => &self.progress_endpoint,
    }
  }
}
