mod app;
mod cache;
mod config;
mod db;
mod event;
mod host;
mod http;
mod logging;
mod notify;
mod outbox;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;

use worker::Event;

#[derive(Parser, Debug)]
#[command(name = "watcher-offline")]
#[command(about = "Offline fetch cache and background sync for the Watcher incident dashboard")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/watcher/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin the dashboard is served from
  #[arg(short, long, global = true, env = "WATCHER_ORIGIN")]
  origin: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the static manifest
  Install,
  /// Drop caches from older versions and start intercepting requests
  Activate,
  /// Fetch a URL through the cache
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Replay queued incident writes
  Sync {
    /// Sync tag (default: the configured tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Deliver a push message (JSON)
  Push { payload: Option<String> },
  /// Click a notification action (view, dismiss, or nothing for a plain click)
  Click { action: Option<String> },
  /// Queue an incident submission (JSON) for background sync
  Queue { payload: String },
  /// List queued incident submissions
  Pending,
  /// List cache namespaces
  Namespaces,
  /// Read JSON events from stdin, one per line
  Run,
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON payload: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };
  config.origin_url()?;

  let _guard = logging::init(&config.log)?;

  let mut app = app::App::new(&config)?;

  match args.command {
    Command::Install => app.run_once(Event::Install).await?,
    Command::Activate => app.run_once(Event::Activate).await?,
    Command::Fetch { url, method } => app.run_once(Event::Fetch { method, url }).await?,
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.tag.clone());
      app.run_once(Event::Sync { tag }).await?
    }
    Command::Push { payload } => {
      let payload = payload.as_deref().map(parse_json).transpose()?;
      app.run_once(Event::Push { payload }).await?
    }
    Command::Click { action } => app.run_once(Event::NotificationClick { action }).await?,
    Command::Queue { payload } => {
      let payload = parse_json(&payload)?;
      app.run_once(Event::Enqueue { payload }).await?
    }
    Command::Pending => app::print_json(&app.pending()?)?,
    Command::Namespaces => app::print_json(&app.namespaces()?)?,
    Command::Run => app.run(event::EventHandler::stdin()).await?,
  }

  Ok(())
}
