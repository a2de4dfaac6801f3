//! Request classification.

use serde::Serialize;
use url::Url;

use crate::config::CacheConfig;
use crate::http::Request;

/// How an intercepted request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  /// Non-GET: never cached, forwarded untouched
  Bypass,
  /// Network first, API namespace with TTL
  ApiTtl,
  /// Static namespace first, network on miss
  CacheFirst,
  /// Network first, falling back to the cached page or the root document
  NetworkFirst,
}

#[derive(Debug, Clone)]
pub struct Router {
  api_marker: String,
  static_extensions: Vec<String>,
}

impl Router {
  pub fn new(config: &CacheConfig) -> Self {
    Self {
      api_marker: config.api_marker.clone(),
      static_extensions: config.static_extensions.clone(),
    }
  }

  pub fn classify(&self, request: &Request) -> Strategy {
    if !request.is_get() {
      return Strategy::Bypass;
    }

    if request.url.path().contains(&self.api_marker) {
      Strategy::ApiTtl
    } else if extension(&request.url).is_some_and(|ext| self.static_extensions.contains(&ext)) {
      Strategy::CacheFirst
    } else {
      Strategy::NetworkFirst
    }
  }
}

/// Whether `url` names a stylesheet.
pub fn is_stylesheet(url: &Url) -> bool {
  extension(url).as_deref() == Some("css")
}

/// Lower-cased extension of the last path segment.
fn extension(url: &Url) -> Option<String> {
  let last = url.path_segments()?.next_back()?;
  let (stem, ext) = last.rsplit_once('.')?;
  if stem.is_empty() || ext.is_empty() {
    return None;
  }
  Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::origin;

  fn classify(method: &str, target: &str) -> Strategy {
    let router = Router::new(&CacheConfig::default());
    router.classify(&Request::new(method, target, &origin()).unwrap())
  }

  #[test]
  fn test_non_get_bypasses() {
    assert_eq!(classify("POST", "/api/incidents"), Strategy::Bypass);
    assert_eq!(classify("PUT", "/static/css/main.css"), Strategy::Bypass);
    assert_eq!(classify("DELETE", "/dashboard"), Strategy::Bypass);
  }

  #[test]
  fn test_api_marker_wins_over_extension() {
    assert_eq!(classify("GET", "/api/incidents"), Strategy::ApiTtl);
    assert_eq!(classify("GET", "/api/export/report.js"), Strategy::ApiTtl);
    assert_eq!(
      classify("GET", "https://api.example.com/v1/api/dashboard"),
      Strategy::ApiTtl
    );
  }

  #[test]
  fn test_static_extensions_are_cache_first() {
    assert_eq!(classify("GET", "/static/js/bundle.js"), Strategy::CacheFirst);
    assert_eq!(classify("GET", "/static/css/main.css?v=3"), Strategy::CacheFirst);
    assert_eq!(classify("GET", "/logo.PNG"), Strategy::CacheFirst);
    assert_eq!(classify("GET", "/favicon.ico"), Strategy::CacheFirst);
  }

  #[test]
  fn test_documents_are_network_first() {
    assert_eq!(classify("GET", "/"), Strategy::NetworkFirst);
    assert_eq!(classify("GET", "/dashboard"), Strategy::NetworkFirst);
    assert_eq!(classify("GET", "/manifest.json"), Strategy::NetworkFirst);
    assert_eq!(classify("GET", "/.css"), Strategy::NetworkFirst);
    // marker only counts in the path
    assert_eq!(classify("GET", "/search?q=/api/"), Strategy::NetworkFirst);
  }

  #[test]
  fn test_stylesheet_detection() {
    assert!(is_stylesheet(&origin().join("/static/css/main.css").unwrap()));
    assert!(is_stylesheet(&origin().join("/theme.CSS?x=1").unwrap()));
    assert!(!is_stylesheet(&origin().join("/static/js/bundle.js").unwrap()));
  }
}
