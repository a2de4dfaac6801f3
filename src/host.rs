//! Console host: the notification and client-window surface when running
//! outside a browser.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info};
use url::Url;

use crate::config::HostConfig;
use crate::notify::{Clients, Notification, Notifier};

/// Logs notifications and opens windows in the system browser when enabled.
///
/// A console process controls no windows, so there is never a client to claim
/// or navigate.
pub struct ConsoleHost {
  open_browser: bool,
}

impl ConsoleHost {
  pub fn new(config: &HostConfig) -> Self {
    Self {
      open_browser: config.open_browser,
    }
  }
}

#[async_trait]
impl Notifier for ConsoleHost {
  async fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.body,
      tag = %notification.tag,
      "Showing notification"
    );
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    debug!(tag, "Closing notification");
    Ok(())
  }
}

#[async_trait]
impl Clients for ConsoleHost {
  async fn list(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  async fn claim(&self) -> Result<usize> {
    Ok(0)
  }

  async fn navigate(&self, client: &str, _url: &Url) -> Result<()> {
    Err(eyre!("Unknown client: {}", client))
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    info!(%url, "Opening window");
    if self.open_browser {
      open::that(url.as_str()).map_err(|e| eyre!("Failed to open {}: {}", url, e))?;
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_console_host_has_no_clients() {
    let host = ConsoleHost::new(&HostConfig::default());
    assert!(host.list().await.unwrap().is_empty());
    assert_eq!(host.claim().await.unwrap(), 0);
    assert!(host
      .navigate("tab-1", &Url::parse("http://localhost:3000/").unwrap())
      .await
      .is_err());
  }

  #[tokio::test]
  async fn test_open_window_without_browser_is_logged_only() {
    let host = ConsoleHost::new(&HostConfig::default());
    host
      .open_window(&Url::parse("http://localhost:3000/incidents").unwrap())
      .await
      .unwrap();
  }
}
