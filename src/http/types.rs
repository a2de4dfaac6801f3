//! Request and response model shared by the cache, the outbox and the host.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Serialize, Serializer};
use url::Url;

/// Synthetic header carrying the time a response was written to the cache
/// (milliseconds since the Unix epoch).
pub const TIMESTAMP_HEADER: &str = "sw-cache-timestamp";

/// An outgoing request as seen by the interception surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Upper-cased HTTP method
  pub method: String,
  /// Absolute URL (relative targets are resolved against the origin)
  pub url: Url,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// Build a request, resolving `target` against `origin` when it is relative.
  pub fn new(method: &str, target: &str, origin: &Url) -> Result<Self> {
    let url = origin
      .join(target.trim())
      .map_err(|e| eyre!("Invalid request URL '{}': {}", target, e))?;

    Ok(Self {
      method: method.trim().to_uppercase(),
      url,
      headers: BTreeMap::new(),
      body: None,
    })
  }

  pub fn get(target: &str, origin: &Url) -> Result<Self> {
    Self::new("GET", target, origin)
  }

  /// A POST carrying `payload` as a JSON body.
  pub fn post_json(target: &str, origin: &Url, payload: &serde_json::Value) -> Result<Self> {
    let mut request = Self::new("POST", target, origin)?;
    request
      .headers
      .insert("content-type".to_string(), "application/json".to_string());
    request.body =
      Some(serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?);
    Ok(request)
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Canonical identity used for cache lookups.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Canonical request identity: method plus absolute URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.trim().to_uppercase(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response, either live from the network, read back from the cache,
/// or synthesized by a fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  /// Header names are stored lower-cased
  pub headers: BTreeMap<String, String>,
  #[serde(serialize_with = "serialize_body")]
  pub body: Vec<u8>,
}

impl Response {
  /// Build a response with a single content-type header.
  pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    let status_text = reqwest::StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();

    Self {
      status,
      status_text,
      headers: BTreeMap::new(),
      body: body.into(),
    }
    .with_header("content-type", content_type)
  }

  pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
    self.headers.insert(name.to_lowercase(), value.into());
    self
  }

  /// True for 2xx statuses.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  /// Copy of this response carrying the cache timestamp header.
  pub fn stamped(&self, at: DateTime<Utc>) -> Self {
    self
      .clone()
      .with_header(TIMESTAMP_HEADER, at.timestamp_millis().to_string())
  }

  /// When this response was written to the cache, if it carries a readable stamp.
  pub fn stored_at(&self) -> Option<DateTime<Utc>> {
    self
      .header(TIMESTAMP_HEADER)
      .and_then(|v| v.trim().parse::<i64>().ok())
      .and_then(DateTime::from_timestamp_millis)
  }

  #[cfg(test)]
  pub fn text(&self) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }
}

fn serialize_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_str(&String::from_utf8_lossy(body))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn origin() -> Url {
    Url::parse("http://localhost:3000").unwrap()
  }

  #[test]
  fn test_relative_and_absolute_targets_share_a_key() {
    let relative = Request::get("/api/incidents", &origin()).unwrap();
    let absolute = Request::get("http://localhost:3000/api/incidents", &origin()).unwrap();
    assert_eq!(relative.key(), absolute.key());
    assert_eq!(relative.key().to_string(), "GET http://localhost:3000/api/incidents");
  }

  #[test]
  fn test_key_ignores_fragment_and_method_case() {
    let a = Request::new("get", "/dashboard#top", &origin()).unwrap();
    let b = Request::get("/dashboard", &origin()).unwrap();
    assert_eq!(a.key(), b.key());
    assert!(a.is_get());
  }

  #[test]
  fn test_post_json_sets_body_and_content_type() {
    let payload = serde_json::json!({"id": "INC-1"});
    let request = Request::post_json("/api/incidents", &origin(), &payload).unwrap();
    assert_eq!(request.method, "POST");
    assert!(!request.is_get());
    assert_eq!(
      request.headers.get("content-type").map(String::as_str),
      Some("application/json")
    );
    assert_eq!(request.body.as_deref(), Some(br#"{"id":"INC-1"}"#.as_slice()));
  }

  #[test]
  fn test_stamp_roundtrips_through_header() {
    let at = Utc::now() - Duration::minutes(6);
    let response = Response::new(200, "application/json", "[]").stamped(at);
    assert_eq!(
      response.stored_at().map(|t| t.timestamp_millis()),
      Some(at.timestamp_millis())
    );
  }

  #[test]
  fn test_unstamped_or_garbled_stamp_has_no_stored_at() {
    let response = Response::new(200, "text/plain", "ok");
    assert!(response.stored_at().is_none());

    let garbled = response.with_header(TIMESTAMP_HEADER, "yesterday");
    assert!(garbled.stored_at().is_none());
  }

  #[test]
  fn test_status_text_and_header_lookup() {
    let response = Response::new(503, "text/html", "down");
    assert_eq!(response.status_text, "Service Unavailable");
    assert!(!response.is_ok());
    assert_eq!(response.header("Content-Type"), Some("text/html"));
  }
}
