use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the dashboard is served from; relative request URLs resolve against it
  pub origin: String,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub http: HttpConfig,
  pub host: HostConfig,
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      http: HttpConfig::default(),
      host: HostConfig::default(),
      log: LogConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Deployment version; qualifies both namespace names
  pub version: String,
  /// How long a cached API response may stand in for the network
  pub api_ttl_secs: u64,
  /// Path fragment that marks API requests
  pub api_marker: String,
  /// Extensions served cache-first (case-insensitive, leading dot optional)
  #[serde(deserialize_with = "deserialize_extensions")]
  pub static_extensions: Vec<String>,
  /// Critical paths pre-cached at install time
  pub manifest: Vec<String>,
  /// SQLite database location (defaults to the user data directory)
  pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      api_ttl_secs: 5 * 60,
      api_marker: "/api/".to_string(),
      static_extensions: ["js", "css", "png", "ico"]
        .into_iter()
        .map(String::from)
        .collect(),
      manifest: [
        "/",
        "/static/js/bundle.js",
        "/static/css/main.css",
        "/manifest.json",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      db_path: None,
    }
  }
}

fn deserialize_extensions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(
    v.into_iter()
      .map(|s| s.trim().trim_start_matches('.').to_lowercase())
      .filter(|s| !s.is_empty())
      .collect(),
  )
}

impl CacheConfig {
  /// Resolve the database path, falling back to `<data_dir>/watcher/offline.db`.
  pub fn db_path(&self) -> Result<PathBuf> {
    match &self.db_path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("offline.db")),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Tag a sync event must carry to drain the queue
  pub tag: String,
  /// Endpoint queued writes are POSTed to
  pub endpoint: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "incident-sync".to_string(),
      endpoint: "/api/incidents".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub request_timeout_secs: u64,
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      request_timeout_secs: 30,
      user_agent: concat!("watcher-offline/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
  /// Open new client windows in the system browser
  pub open_browser: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Directory for the rolling log file (defaults to `<data_dir>/watcher/logs`)
  pub directory: Option<PathBuf>,
  /// Filter used when RUST_LOG is unset
  pub filter: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      directory: None,
      filter: "info,watcher_offline=debug".to_string(),
    }
  }
}

impl LogConfig {
  pub fn directory(&self) -> Result<PathBuf> {
    match &self.directory {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("logs")),
    }
  }
}

fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("watcher"))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./watcher.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/watcher/config.yaml
  ///
  /// Without any file the built-in defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("watcher.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("watcher").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.origin_url()?;
    Ok(config)
  }

  /// The origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }
}
