mod app;
mod cache;
mod config;
mod db;
mod http;
mod sync;
#[cfg(test)]
mod testutil;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "faceyoga-sw")]
#[command(about = "Offline cache worker for the FaceYoga AI+ web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/faceyoga-sw/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin the worker serves, overriding the config file
  #[arg(short, long, global = true)]
  origin: Option<String>,

  /// Log at debug level
  #[arg(long, global = true)]
  debug: bool,

  /// Also append logs to this file
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

/// Events and inspections the command line can drive.
#[derive(Subcommand, Debug)]
pub enum Command {
  /// Install and activate the configured cache generation
  Start,
  /// Prime the static partition with the app shell
  Install,
  /// Remove partitions of older generations and take control
  Activate,
  /// Send a request through the worker, as a page would
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
    /// Print status line and headers before the body
    #[arg(short, long)]
    include: bool,
  },
  /// Replay the queue for a sync tag
  Sync { tag: String },
  /// Inspect or extend the background sync queue
  Queue {
    #[command(subcommand)]
    action: QueueCommand,
  },
  /// Post a JSON message to the worker
  Message { json: String },
  /// Deliver a push with an optional text payload
  Push { text: Option<String> },
  /// Click the notification, optionally on an action button
  Click { action: Option<String> },
  /// List cache partitions
  Caches {
    /// Also list the URLs stored in each partition
    #[arg(long)]
    entries: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
  /// Queue a JSON item (must carry an `id`) under a sync tag
  Add { tag: String, json: String },
  /// Show queued items, for one tag or all
  List { tag: Option<String> },
}

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
fn init_tracing(debug: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = if debug {
    EnvFilter::new("faceyoga_sw=debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("faceyoga_sw=info"))
  };

  let (file_layer, guard) = match log_file {
    Some(path) => {
      let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| eyre!("Failed to open log file {}: {}", path.display(), e))?;
      let (writer, guard) = tracing_appender::non_blocking(file);
      (
        Some(fmt::layer().with_ansi(false).with_writer(writer)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr),
    )
    .with(file_layer)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.debug, args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  let app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}
