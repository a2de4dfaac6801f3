use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::debug;

use crate::config::HttpConfig;

use super::types::{Request, Response};

/// Network collaborator.
///
/// `Err` means the request never produced a response (DNS, connection,
/// timeout). Any HTTP status, including 4xx/5xx, comes back as `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed fetcher used by the host.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new(config: &HttpConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method '{}': {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_lowercase(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    debug!(method = %request.method, url = %request.url, status = status.as_u16(), "Fetched");

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
    })
  }
}
