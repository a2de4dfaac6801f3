//! Core types for the caching system.

use serde::Serialize;

use crate::http::Response;

/// The two disjoint cache namespaces of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
  /// Static assets and documents, superseded only by a new version
  pub static_name: String,
  /// API responses, bounded by the TTL
  pub api_name: String,
}

impl Namespaces {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_name: format!("watcher-incident-system-{}", version),
      api_name: format!("watcher-api-cache-{}", version),
    }
  }

  /// Whether `name` belongs to the current deployment.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.api_name
  }
}

/// Result from a cache operation, including the response and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheResult {
  pub source: CacheSource,
  pub response: Response,
}

impl CacheResult {
  /// Live response straight from the network.
  pub fn from_network(response: Response) -> Self {
    Self {
      source: CacheSource::Network,
      response,
    }
  }

  /// Entry stored under the request's own key.
  pub fn from_cache(response: Response) -> Self {
    Self {
      source: CacheSource::Cache,
      response,
    }
  }

  /// Cached root document standing in for another page.
  pub fn root_fallback(response: Response) -> Self {
    Self {
      source: CacheSource::RootFallback,
      response,
    }
  }

  /// Synthesized offline response.
  pub fn offline(response: Response) -> Self {
    Self {
      source: CacheSource::Offline,
      response,
    }
  }

  /// Request that was not intercepted.
  pub fn passthrough(response: Response) -> Self {
    Self {
      source: CacheSource::Passthrough,
      response,
    }
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Stored entry for the same request
  Cache,
  /// Cached root document served for a different page
  RootFallback,
  /// Offline mode - nothing usable cached, response synthesized
  Offline,
  /// Not intercepted, forwarded as-is
  Passthrough,
}
