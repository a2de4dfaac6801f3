//! Event dispatch: the worker's lifecycle and its handlers for each host event.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheLayer, CacheResult, CacheStorage, SqliteStorage, Strategy};
use crate::config::Config;
use crate::http::{Fetcher, Request};
use crate::notify::{ClickOutcome, Clients, Notification, Notifications, Notifier};
use crate::outbox::{Outbox, PendingWrite, SyncReport, WriteQueue};

/// Events delivered by the host runtime.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
  Install,
  Activate,
  Fetch {
    #[serde(default = "default_method")]
    method: String,
    url: String,
  },
  Sync {
    tag: String,
  },
  Push {
    #[serde(default)]
    payload: Option<Value>,
  },
  NotificationClick {
    #[serde(default)]
    action: Option<String>,
  },
  /// A write the dashboard could not deliver
  Enqueue {
    payload: Value,
  },
}

fn default_method() -> String {
  "GET".to_string()
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Install => "install",
      Self::Activate => "activate",
      Self::Fetch { .. } => "fetch",
      Self::Sync { .. } => "sync",
      Self::Push { .. } => "push",
      Self::NotificationClick { .. } => "notification_click",
      Self::Enqueue { .. } => "enqueue",
    }
  }
}

/// Where the worker is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
  /// Not installed for this version; requests go straight to the network
  Parsed,
  /// Static cache populated, waiting for activation
  Installed,
  /// Old namespaces gone, clients claimed, requests intercepted
  Activated,
}

impl Lifecycle {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Parsed => "parsed",
      Self::Installed => "installed",
      Self::Activated => "activated",
    }
  }
}

impl FromStr for Lifecycle {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "parsed" => Ok(Self::Parsed),
      "installed" => Ok(Self::Installed),
      "activated" => Ok(Self::Activated),
      other => Err(eyre!("Unknown lifecycle state: {}", other)),
    }
  }
}

/// Persists the lifecycle per deployment version, so a new version starts
/// over from `Parsed`.
pub trait StateStore: Send + Sync {
  fn load_state(&self, version: &str) -> Result<Option<Lifecycle>>;
  fn save_state(&self, version: &str, state: Lifecycle) -> Result<()>;
}

impl StateStore for SqliteStorage {
  fn load_state(&self, version: &str) -> Result<Option<Lifecycle>> {
    let conn = self.lock()?;
    let state: Option<String> = conn
      .query_row(
        "SELECT lifecycle FROM worker_state WHERE version = ?",
        params![version],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load worker state: {}", e))?;

    state.as_deref().map(Lifecycle::from_str).transpose()
  }

  fn save_state(&self, version: &str, state: Lifecycle) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO worker_state (version, lifecycle, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![version, state.as_str()],
      )
      .map_err(|e| eyre!("Failed to save worker state: {}", e))?;
    Ok(())
  }
}

/// Result of handling one event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  Installed {
    cached: usize,
  },
  Activated {
    deleted: Vec<String>,
    claimed: usize,
  },
  Response {
    strategy: Strategy,
    #[serde(flatten)]
    result: CacheResult,
  },
  Synced {
    report: SyncReport,
  },
  Notified {
    notification: Notification,
  },
  Clicked {
    result: ClickOutcome,
  },
  Queued {
    write: PendingWrite,
  },
  Ignored {
    reason: String,
  },
}

pub struct Worker<S, F, H>
where
  S: CacheStorage + WriteQueue + StateStore,
  F: Fetcher,
  H: Notifier + Clients,
{
  storage: Arc<S>,
  host: Arc<H>,
  cache: CacheLayer<S, F>,
  outbox: Outbox<S, F>,
  notifications: Notifications<H>,
  origin: Url,
  version: String,
  state: Lifecycle,
}

impl<S, F, H> Worker<S, F, H>
where
  S: CacheStorage + WriteQueue + StateStore,
  F: Fetcher,
  H: Notifier + Clients,
{
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, host: Arc<H>, config: &Config) -> Result<Self> {
    let version = config.cache.version.clone();
    let state = storage.load_state(&version)?.unwrap_or(Lifecycle::Parsed);
    debug!(%version, state = state.as_str(), "Worker loaded");

    Ok(Self {
      cache: CacheLayer::new(storage.clone(), fetcher.clone(), config)?,
      outbox: Outbox::new(storage.clone(), fetcher, config)?,
      notifications: Notifications::new(host.clone(), config)?,
      origin: config.origin_url()?,
      storage,
      host,
      version,
      state,
    })
  }

  #[cfg(test)]
  pub fn state(&self) -> Lifecycle {
    self.state
  }

  pub fn outbox(&self) -> &Outbox<S, F> {
    &self.outbox
  }

  /// Route an event to its handler and wait for the work to finish.
  pub async fn dispatch(&mut self, event: Event) -> Result<Outcome> {
    debug!(kind = event.kind(), "Dispatching event");

    match event {
      Event::Install => self.on_install().await,
      Event::Activate => self.on_activate().await,
      Event::Fetch { method, url } => self.on_fetch(&method, &url).await,
      Event::Sync { tag } => self.on_sync(&tag).await,
      Event::Push { payload } => self.on_push(payload.as_ref()).await,
      Event::NotificationClick { action } => self.on_notification_click(action.as_deref()).await,
      Event::Enqueue { payload } => self.on_enqueue(payload),
    }
  }

  async fn on_install(&mut self) -> Result<Outcome> {
    info!("Installing");
    let cached = self.cache.install().await?;

    // Skip waiting: an installed worker may activate right away
    if self.state == Lifecycle::Parsed {
      self.set_state(Lifecycle::Installed)?;
    }

    Ok(Outcome::Installed { cached })
  }

  async fn on_activate(&mut self) -> Result<Outcome> {
    if self.state == Lifecycle::Parsed {
      return Err(eyre!(
        "Cannot activate version {} before it is installed",
        self.version
      ));
    }

    info!("Activating");
    let deleted = self.cache.activate()?;
    let claimed = self.host.claim().await?;
    self.set_state(Lifecycle::Activated)?;

    Ok(Outcome::Activated { deleted, claimed })
  }

  async fn on_fetch(&self, method: &str, url: &str) -> Result<Outcome> {
    let request = Request::new(method, url, &self.origin)?;

    if self.state != Lifecycle::Activated {
      debug!(url = %request.url, "Worker not active, passing request through");
      let result = self.cache.passthrough(&request).await?;
      return Ok(Outcome::Response {
        strategy: Strategy::Bypass,
        result,
      });
    }

    let strategy = self.cache.classify(&request);
    let result = self.cache.handle(&request).await?;
    Ok(Outcome::Response { strategy, result })
  }

  async fn on_sync(&self, tag: &str) -> Result<Outcome> {
    if tag != self.outbox.tag() {
      return Ok(Outcome::Ignored {
        reason: format!("unknown sync tag '{}'", tag),
      });
    }

    let report = self.outbox.drain().await?;
    Ok(Outcome::Synced { report })
  }

  async fn on_push(&self, payload: Option<&Value>) -> Result<Outcome> {
    let notification = self.notifications.push(payload).await?;
    Ok(Outcome::Notified { notification })
  }

  async fn on_notification_click(&self, action: Option<&str>) -> Result<Outcome> {
    let result = self.notifications.click(action).await?;
    Ok(Outcome::Clicked { result })
  }

  fn on_enqueue(&self, payload: Value) -> Result<Outcome> {
    let write = self.outbox.enqueue(payload)?;
    Ok(Outcome::Queued { write })
  }

  fn set_state(&mut self, state: Lifecycle) -> Result<()> {
    self.storage.save_state(&self.version, state)?;
    info!(version = %self.version, state = state.as_str(), "Worker state changed");
    self.state = state;
    Ok(())
  }
}
