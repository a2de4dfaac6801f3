//! Incident notifications derived from push payloads, and what a click on one does.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::config::Config;

pub const NOTIFICATION_TITLE: &str = "Watcher - Incident Update";
const DEFAULT_BODY: &str = "You have new incident updates";
const NOTIFICATION_TAG: &str = "incident-notification";
const ICON: &str = "/favicon.ico";
const INCIDENTS_PATH: &str = "/incidents";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub data: Value,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

impl Notification {
  /// Build the incident notification for a push, with or without a payload.
  pub fn from_push(payload: Option<&Value>) -> Self {
    let body = payload
      .and_then(|p| p.get("message"))
      .and_then(Value::as_str)
      .filter(|m| !m.is_empty())
      .unwrap_or(DEFAULT_BODY)
      .to_string();

    Self {
      title: NOTIFICATION_TITLE.to_string(),
      body,
      icon: ICON.to_string(),
      badge: ICON.to_string(),
      tag: NOTIFICATION_TAG.to_string(),
      data: payload
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default())),
      actions: vec![
        NotificationAction {
          action: "view".to_string(),
          title: "View Incidents".to_string(),
          icon: Some(ICON.to_string()),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Dismiss".to_string(),
          icon: None,
        },
      ],
    }
  }
}

/// Action chosen on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  View,
  Dismiss,
  /// Click on the notification body
  Open,
}

impl ClickAction {
  pub fn parse(action: Option<&str>) -> Self {
    match action.map(str::trim) {
      Some("view") => Self::View,
      Some("dismiss") => Self::Dismiss,
      _ => Self::Open,
    }
  }
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickOutcome {
  Navigated { client: String, url: String },
  Opened { url: String },
  Dismissed,
}

/// Shows and closes system notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show_notification(&self, notification: &Notification) -> Result<()>;
  async fn close_notification(&self, tag: &str) -> Result<()>;
}

/// Open client windows controlled by the worker.
#[async_trait]
pub trait Clients: Send + Sync {
  /// Ids of the open client windows.
  async fn list(&self) -> Result<Vec<String>>;
  /// Take control of every open client. Returns how many were claimed.
  async fn claim(&self) -> Result<usize>;
  async fn navigate(&self, client: &str, url: &Url) -> Result<()>;
  async fn open_window(&self, url: &Url) -> Result<()>;
}

pub struct Notifications<H: Notifier + Clients> {
  host: Arc<H>,
  origin: Url,
}

impl<H: Notifier + Clients> Notifications<H> {
  pub fn new(host: Arc<H>, config: &Config) -> Result<Self> {
    Ok(Self {
      host,
      origin: config.origin_url()?,
    })
  }

  pub async fn push(&self, payload: Option<&Value>) -> Result<Notification> {
    info!("Push received");
    let notification = Notification::from_push(payload);
    self.host.show_notification(&notification).await?;
    Ok(notification)
  }

  /// Close the notification, then act on the chosen action.
  pub async fn click(&self, action: Option<&str>) -> Result<ClickOutcome> {
    info!(action = action.unwrap_or("default"), "Notification click received");
    self.host.close_notification(NOTIFICATION_TAG).await?;

    match ClickAction::parse(action) {
      ClickAction::Dismiss => Ok(ClickOutcome::Dismissed),
      ClickAction::View => {
        let url = self.resolve(INCIDENTS_PATH)?;
        if let Some(client) = self.host.list().await?.into_iter().next() {
          self.host.navigate(&client, &url).await?;
          Ok(ClickOutcome::Navigated {
            client,
            url: url.into(),
          })
        } else {
          self.host.open_window(&url).await?;
          Ok(ClickOutcome::Opened { url: url.into() })
        }
      }
      ClickAction::Open => {
        let url = self.resolve("/")?;
        self.host.open_window(&url).await?;
        Ok(ClickOutcome::Opened { url: url.into() })
      }
    }
  }

  fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::testing::RecordingHost;
  use serde_json::json;

  fn notifications(host: &Arc<RecordingHost>) -> Notifications<RecordingHost> {
    Notifications::new(host.clone(), &Config::default()).unwrap()
  }

  #[test]
  fn test_default_notification_without_payload() {
    let notification = Notification::from_push(None);
    assert_eq!(notification.title, "Watcher - Incident Update");
    assert_eq!(notification.body, "You have new incident updates");
    assert_eq!(notification.tag, "incident-notification");
    assert_eq!(notification.data, json!({}));
    let actions: Vec<&str> = notification
      .actions
      .iter()
      .map(|a| a.action.as_str())
      .collect();
    assert_eq!(actions, vec!["view", "dismiss"]);
  }

  #[test]
  fn test_payload_message_becomes_body() {
    let payload = json!({"message": "INC-12 escalated", "incidentId": "INC-12"});
    let notification = Notification::from_push(Some(&payload));
    assert_eq!(notification.body, "INC-12 escalated");
    assert_eq!(notification.data, payload);
  }

  #[test]
  fn test_payload_without_message_keeps_default_body() {
    let payload = json!({"incidentId": "INC-3"});
    let notification = Notification::from_push(Some(&payload));
    assert_eq!(notification.body, "You have new incident updates");
    assert_eq!(notification.data["incidentId"], "INC-3");
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let host = Arc::new(RecordingHost::new());
    notifications(&host).push(None).await.unwrap();
    assert_eq!(host.shown().len(), 1);
  }

  #[tokio::test]
  async fn test_view_navigates_existing_client() {
    let host = Arc::new(RecordingHost::with_clients(&["tab-1", "tab-2"]));

    let outcome = notifications(&host).click(Some("view")).await.unwrap();

    assert_eq!(
      outcome,
      ClickOutcome::Navigated {
        client: "tab-1".to_string(),
        url: "http://localhost:3000/incidents".to_string(),
      }
    );
    assert!(host.opened().is_empty());
    assert_eq!(host.closed(), vec!["incident-notification"]);
  }

  #[tokio::test]
  async fn test_view_without_clients_opens_window() {
    let host = Arc::new(RecordingHost::new());

    let outcome = notifications(&host).click(Some("view")).await.unwrap();

    assert_eq!(
      outcome,
      ClickOutcome::Opened {
        url: "http://localhost:3000/incidents".to_string()
      }
    );
    assert_eq!(host.opened(), vec!["http://localhost:3000/incidents"]);
  }

  #[tokio::test]
  async fn test_dismiss_only_closes() {
    let host = Arc::new(RecordingHost::with_clients(&["tab-1"]));

    let outcome = notifications(&host).click(Some("dismiss")).await.unwrap();

    assert_eq!(outcome, ClickOutcome::Dismissed);
    assert!(host.opened().is_empty());
    assert!(host.navigated().is_empty());
    assert_eq!(host.closed().len(), 1);
  }

  #[tokio::test]
  async fn test_plain_click_opens_app_root() {
    let host = Arc::new(RecordingHost::new());

    let outcome = notifications(&host).click(None).await.unwrap();

    assert_eq!(
      outcome,
      ClickOutcome::Opened {
        url: "http://localhost:3000/".to_string()
      }
    );
  }
}
