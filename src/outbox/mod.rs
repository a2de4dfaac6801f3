//! Deferred write queue replayed when connectivity returns.
//!
//! Retry cadence belongs to whoever fires the sync event; a drain pass makes
//! one attempt per queued write and keeps whatever fails.

mod queue;

pub use queue::{PendingWrite, WriteQueue};

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::http::{Fetcher, Request};

/// Ids delivered and ids kept by one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  pub synced: Vec<String>,
  pub retained: Vec<String>,
}

pub struct Outbox<Q: WriteQueue, F: Fetcher> {
  queue: Arc<Q>,
  fetcher: Arc<F>,
  origin: Url,
  endpoint: String,
  tag: String,
}

impl<Q: WriteQueue, F: Fetcher> Outbox<Q, F> {
  pub fn new(queue: Arc<Q>, fetcher: Arc<F>, config: &Config) -> Result<Self> {
    Ok(Self {
      queue,
      fetcher,
      origin: config.origin_url()?,
      endpoint: config.sync.endpoint.clone(),
      tag: config.sync.tag.clone(),
    })
  }

  /// Sync tag that triggers a drain.
  pub fn tag(&self) -> &str {
    &self.tag
  }

  pub fn enqueue(&self, payload: Value) -> Result<PendingWrite> {
    let write = PendingWrite::new(payload);
    self.queue.enqueue(&write)?;
    info!(id = %write.id, "Queued incident for background sync");
    Ok(write)
  }

  pub fn pending(&self) -> Result<Vec<PendingWrite>> {
    self.queue.dequeue_all()
  }

  /// POST every queued write in order, removing the ones the server accepts.
  ///
  /// Only a failure to read the queue is returned as an error; per-write
  /// failures are logged and the write stays queued.
  pub async fn drain(&self) -> Result<SyncReport> {
    let writes = self.queue.dequeue_all()?;
    info!(count = writes.len(), "Background sync triggered for incidents");

    let mut report = SyncReport::default();
    for write in writes {
      if let Err(e) = self.replay(&write).await {
        warn!(id = %write.id, error = %e, "Failed to sync incident");
        report.retained.push(write.id);
        continue;
      }

      match self.queue.remove(&write.id) {
        Ok(_) => {
          info!(id = %write.id, "Synced incident");
          report.synced.push(write.id);
        }
        Err(e) => {
          warn!(id = %write.id, error = %e, "Synced incident but could not remove it from the queue");
          report.retained.push(write.id);
        }
      }
    }

    Ok(report)
  }

  async fn replay(&self, write: &PendingWrite) -> Result<()> {
    let request = Request::post_json(&self.endpoint, &self.origin, &write.payload)?;
    let response = self.fetcher.fetch(&request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Server rejected {} with status {}",
        write.id,
        response.status
      ));
    }
    Ok(())
  }
}
