//! Cache layer that applies the caching strategies around the network client.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::http::{Fetcher, Request, RequestKey, Response};

use super::router::{is_stylesheet, Router, Strategy};
use super::storage::CacheStorage;
use super::traits::{CacheResult, Namespaces};

const OFFLINE_MESSAGE: &str = "Unable to fetch data. Please check your connection.";
const OFFLINE_STYLES: &str = "/* Offline fallback styles */";
const OFFLINE_PAGE: &str = "Offline - Please check your connection";

/// Cache layer that manages caching logic and network fetching.
///
/// Sits between intercepted requests and the network client. Writes for the
/// same key are not serialized: when two fetches for one key overlap, the one
/// that completes last wins, regardless of which was issued first.
pub struct CacheLayer<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  router: Router,
  namespaces: Namespaces,
  /// How long a cached API response may be served while the network is down
  api_ttl: Duration,
  origin: Url,
  manifest: Vec<String>,
}

impl<S: CacheStorage, F: Fetcher> CacheLayer<S, F> {
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, config: &Config) -> Result<Self> {
    let api_ttl = i64::try_from(config.cache.api_ttl_secs)
      .ok()
      .and_then(Duration::try_seconds)
      .ok_or_else(|| eyre!("API TTL out of range: {}s", config.cache.api_ttl_secs))?;

    Ok(Self {
      storage,
      fetcher,
      router: Router::new(&config.cache),
      namespaces: Namespaces::for_version(&config.cache.version),
      api_ttl,
      origin: config.origin_url()?,
      manifest: config.cache.manifest.clone(),
    })
  }

  pub fn classify(&self, request: &Request) -> Strategy {
    self.router.classify(request)
  }

  /// Serve an intercepted request with the strategy its URL calls for.
  pub async fn handle(&self, request: &Request) -> Result<CacheResult> {
    let strategy = self.classify(request);
    debug!(method = %request.method, url = %request.url, ?strategy, "Routing request");

    match strategy {
      Strategy::Bypass => self.passthrough(request).await,
      Strategy::ApiTtl => self.handle_api(request).await,
      Strategy::CacheFirst => self.handle_static(request).await,
      Strategy::NetworkFirst => self.handle_page(request).await,
    }
  }

  /// Forward a request without touching the cache.
  pub async fn passthrough(&self, request: &Request) -> Result<CacheResult> {
    let response = self.fetcher.fetch(request).await?;
    Ok(CacheResult::passthrough(response))
  }

  /// Network first; on failure serve the cached copy while it is younger than the TTL.
  ///
  /// Non-2xx responses count as failures. Storage errors fail the request.
  async fn handle_api(&self, request: &Request) -> Result<CacheResult> {
    let namespace = &self.namespaces.api_name;
    let key = request.key();
    self.storage.open_namespace(namespace)?;

    match self.fetcher.fetch(request).await {
      Ok(response) if response.is_ok() => {
        self
          .storage
          .put(namespace, &key, &response.stamped(Utc::now()))?;
        return Ok(CacheResult::from_network(response));
      }
      Ok(response) => {
        warn!(url = %request.url, status = response.status, "API request failed, trying cache");
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network failed, trying cache");
      }
    }

    if let Some(cached) = self.storage.get(namespace, &key)? {
      let fresh = cached
        .stored_at()
        .is_some_and(|stored_at| Utc::now() - stored_at < self.api_ttl);
      if fresh {
        return Ok(CacheResult::from_cache(cached));
      }

      debug!(%key, "Cached API response expired");
      self.storage.delete(namespace, &key)?;
    }

    Ok(CacheResult::offline(offline_api_response()))
  }

  /// Static namespace first; the network only on a miss.
  async fn handle_static(&self, request: &Request) -> Result<CacheResult> {
    let namespace = &self.namespaces.static_name;
    let key = request.key();

    if let Some(cached) = self.storage.get(namespace, &key)? {
      return Ok(CacheResult::from_cache(cached));
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.storage.put(namespace, &key, &response)?;
        }
        Ok(CacheResult::from_network(response))
      }
      Err(e) if is_stylesheet(&request.url) => {
        warn!(url = %request.url, error = %e, "Failed to fetch stylesheet, serving fallback");
        Ok(CacheResult::offline(offline_stylesheet_response()))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Failed to fetch static asset");
        Err(e.wrap_err(format!("Failed to fetch static asset {}", request.url)))
      }
    }
  }

  /// Network first; on failure the cached page, then the cached root document.
  async fn handle_page(&self, request: &Request) -> Result<CacheResult> {
    let namespace = &self.namespaces.static_name;
    let key = request.key();

    let error = match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.storage.put(namespace, &key, &response)?;
        }
        return Ok(CacheResult::from_network(response));
      }
      Err(e) => e,
    };

    warn!(url = %request.url, error = %error, "Network failed, trying cache for page");

    if let Some(cached) = self.storage.get(namespace, &key)? {
      return Ok(CacheResult::from_cache(cached));
    }

    if let Some(root) = self.storage.get(namespace, &self.root_key())? {
      return Ok(CacheResult::root_fallback(root));
    }

    Ok(CacheResult::offline(offline_page_response()))
  }

  /// Pre-populate the static namespace from the manifest.
  ///
  /// Every entry is fetched before anything is written, and the writes share
  /// one transaction: a single unreachable entry leaves storage untouched.
  pub async fn install(&self) -> Result<usize> {
    let requests = self
      .manifest
      .iter()
      .map(|path| Request::get(path, &self.origin))
      .collect::<Result<Vec<_>>>()?;

    info!(count = requests.len(), "Caching static assets");

    let entries = try_join_all(requests.iter().map(|request| async move {
      let response = self
        .fetcher
        .fetch(request)
        .await
        .map_err(|e| e.wrap_err(format!("Failed to cache {}", request.url)))?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to cache {}: status {}",
          request.url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((request.key(), response))
    }))
    .await?;

    self
      .storage
      .put_all(&self.namespaces.static_name, &entries)?;

    Ok(entries.len())
  }

  /// Delete every namespace that does not belong to the current version.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for name in self.storage.list_namespaces()? {
      if self.namespaces.is_current(&name) {
        continue;
      }

      info!(namespace = %name, "Deleting old cache");
      if self.storage.delete_namespace(&name)? {
        deleted.push(name);
      }
    }

    Ok(deleted)
  }

  fn root_key(&self) -> RequestKey {
    let mut root = self.origin.clone();
    root.set_path("/");
    root.set_query(None);
    RequestKey::new("GET", &root)
  }
}

impl<S: CacheStorage, F: Fetcher> Clone for CacheLayer<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      router: self.router.clone(),
      namespaces: self.namespaces.clone(),
      api_ttl: self.api_ttl,
      origin: self.origin.clone(),
      manifest: self.manifest.clone(),
    }
  }
}

fn offline_api_response() -> Response {
  let body = serde_json::json!({
    "error": "Offline",
    "message": OFFLINE_MESSAGE,
  });
  Response::new(503, "application/json", body.to_string())
}

fn offline_stylesheet_response() -> Response {
  Response::new(200, "text/css", OFFLINE_STYLES)
}

fn offline_page_response() -> Response {
  Response::new(503, "text/html", OFFLINE_PAGE)
}
