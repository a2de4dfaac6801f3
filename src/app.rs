use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::event::EventHandler;
use crate::host::ConsoleHost;
use crate::http::HttpClient;
use crate::outbox::PendingWrite;
use crate::worker::{Event, Outcome, Worker};

/// Error line printed when an event fails in the event loop
#[derive(Serialize)]
struct Failure<'a> {
  outcome: &'static str,
  event: Option<&'a str>,
  message: String,
}

/// Main application state
pub struct App {
  storage: Arc<SqliteStorage>,
  worker: Worker<SqliteStorage, HttpClient, ConsoleHost>,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let db_path = config.cache.db_path()?;
    let storage = Arc::new(SqliteStorage::new(Database::open(&db_path)?));
    let fetcher = Arc::new(HttpClient::new(&config.http)?);
    let host = Arc::new(ConsoleHost::new(&config.host));
    let worker = Worker::new(storage.clone(), fetcher, host, config)?;

    info!(db = %db_path.display(), origin = %config.origin, "Worker host ready");

    Ok(Self { storage, worker })
  }

  /// Handle a single event.
  pub async fn handle(&mut self, event: Event) -> Result<Outcome> {
    self.worker.dispatch(event).await
  }

  /// Handle a single event and print its outcome.
  pub async fn run_once(&mut self, event: Event) -> Result<()> {
    let outcome = self.handle(event).await?;
    print_json(&outcome)
  }

  /// Process events until the stream ends.
  ///
  /// A failing event is reported on stdout and does not stop the loop.
  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    while let Some(next) = events.next().await {
      let event = match next {
        Ok(event) => event,
        Err(e) => {
          error!(error = %e, "Skipping unreadable event");
          print_json(&Failure {
            outcome: "error",
            event: None,
            message: e.to_string(),
          })?;
          continue;
        }
      };

      let kind = event.kind();
      match self.handle(event).await {
        Ok(outcome) => print_json(&outcome)?,
        Err(e) => {
          error!(event = kind, error = %e, "Event failed");
          print_json(&Failure {
            outcome: "error",
            event: Some(kind),
            message: format!("{:#}", e),
          })?;
        }
      }
    }

    Ok(())
  }

  pub fn pending(&self) -> Result<Vec<PendingWrite>> {
    self.worker.outbox().pending()
  }

  pub fn namespaces(&self) -> Result<Vec<String>> {
    self.storage.list_namespaces()
  }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let line = serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", line);
  Ok(())
}
