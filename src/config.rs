use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://oauth.gravitalia.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  /// Base URL of the identity API (`/users/@me` is appended)
  #[serde(default = "default_api_url")]
  pub api_url: String,
  /// CDN used by the front-end for avatars. Passed through, never fetched.
  #[serde(default = "default_cdn_url")]
  pub cdn_url: String,
  /// Development builds never register the offline worker
  #[serde(default)]
  pub development: bool,
  #[serde(default = "default_timeout_secs")]
  pub request_timeout_secs: u64,
  /// Locale codes offered by the front-end
  #[serde(default = "default_locales")]
  pub locales: Vec<String>,
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
  /// Origin that manifest paths and relative fetches resolve against
  #[serde(default = "default_origin")]
  pub origin: String,
  #[serde(default = "default_cache_name")]
  pub cache_name: String,
  /// Build identifier appended to the bucket name when set
  pub version: Option<String>,
  /// Delete buckets from older versions when activating
  #[serde(default)]
  pub evict_stale_buckets: bool,
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log file (defaults to <data_dir>/gravitalia/gravitalia.log)
  pub file: Option<PathBuf>,
}

fn default_api_url() -> String {
  DEFAULT_API_URL.to_string()
}

fn default_cdn_url() -> String {
  "https://res.cloudinary.com/dimtq5hwr/image/upload/s--4SMIfypA--".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_locales() -> Vec<String> {
  vec!["en".to_string(), "fr".to_string()]
}

fn default_origin() -> String {
  "https://www.gravitalia.com".to_string()
}

fn default_cache_name() -> String {
  "account".to_string()
}

fn default_manifest() -> Vec<String> {
  vec!["/favicon.webp".to_string(), "/sw.js".to_string()]
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: default_api_url(),
      cdn_url: default_cdn_url(),
      development: false,
      request_timeout_secs: default_timeout_secs(),
      locales: default_locales(),
      worker: WorkerConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache_name: default_cache_name(),
      version: None,
      evict_stale_buckets: false,
      manifest: default_manifest(),
    }
  }
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

impl WorkerConfig {
  /// Name of the cache bucket, suffixed with the build version if any.
  pub fn bucket_name(&self) -> String {
    match self.version.as_deref() {
      Some(v) if !v.is_empty() => format!("{}-{}", self.cache_name, v),
      _ => self.cache_name.clone(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./gravitalia.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/gravitalia/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists.
  /// `GRAVITALIA_API_URL` overrides `api_url` in every case.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var("GRAVITALIA_API_URL") {
      config.api_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("gravitalia.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("gravitalia").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  /// Whether a locale code is one the front-end offers.
  pub fn supports_locale(&self, locale: &str) -> bool {
    self.locales.iter().any(|l| l.eq_ignore_ascii_case(locale))
  }

  /// Effective configuration as YAML, defaults and overrides applied.
  pub fn to_yaml(&self) -> Result<String> {
    serde_yaml::to_string(self).map_err(|e| eyre!("Failed to serialize config: {}", e))
  }

  /// The offline worker is only registered outside development builds.
  pub fn register_worker(&self) -> bool {
    !self.development
  }
}
