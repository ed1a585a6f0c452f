use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const API_URL_ENV: &str = "OMNIWISE_API_URL";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub submit: SubmitConfig,
  /// Course to open when nothing was selected before
  pub default_course: Option<u64>,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the REST API, e.g. "https://omniwise.example.edu/api"
  #[serde(default)]
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: String::new(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl ApiConfig {
  /// Parsed base URL, always ending in `/` so relative paths join under it.
  pub fn base_url(&self) -> Result<Url> {
    if self.base_url.trim().is_empty() {
      return Err(eyre!(
        "No API base URL configured. Set api.base_url in the config file, \
         {} in the environment, or pass --api-url.",
        API_URL_ENV
      ));
    }

    let mut raw = self.base_url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }

    let url = Url::parse(&raw).map_err(|e| eyre!("Invalid API base URL '{}': {}", raw, e))?;
    if url.cannot_be_a_base() {
      return Err(eyre!("API base URL '{}' cannot be used as a base", raw));
    }
    Ok(url)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds a fetched value is served without refetching
  #[serde(default = "default_stale_after_secs")]
  pub stale_after_secs: u64,
  /// Seconds after which an unused value is dropped
  #[serde(default = "default_gc_after_secs")]
  pub gc_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
  60
}

fn default_gc_after_secs() -> u64 {
  300
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after_secs: default_stale_after_secs(),
      gc_after_secs: default_gc_after_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_after(&self) -> Duration {
    Duration::from_secs(self.stale_after_secs)
  }

  pub fn gc_after(&self) -> Duration {
    Duration::from_secs(self.gc_after_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitConfig {
  /// How long a submission must run before the spinner shows
  #[serde(default = "default_spinner_delay_ms")]
  pub spinner_delay_ms: u64,
}

fn default_spinner_delay_ms() -> u64 {
  2000
}

impl Default for SubmitConfig {
  fn default() -> Self {
    Self {
      spinner_delay_ms: default_spinner_delay_ms(),
    }
  }
}

impl SubmitConfig {
  pub fn spinner_delay(&self) -> Duration {
    Duration::from_millis(self.spinner_delay_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./omniwise.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/omniwise/config.yaml
  ///
  /// Without a file, defaults are used. `OMNIWISE_API_URL` overrides the
  /// file's base URL either way.
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
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.base_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("omniwise.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("omniwise").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Header title: the configured one, or the API host.
  pub fn display_title(&self) -> String {
    if let Some(title) = &self.title {
      return title.clone();
    }
    self
      .api
      .base_url()
      .ok()
      .and_then(|u| u.host_str().map(String::from))
      .unwrap_or_else(|| "omniwise".to_string())
  }

  /// Session token from the environment, overriding the stored one.
  ///
  /// Checks OMNIWISE_TOKEN.
  pub fn get_token_override() -> Option<String> {
    std::env::var("OMNIWISE_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }

  /// Get the login password from environment variables.
  ///
  /// Checks OMNIWISE_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("OMNIWISE_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set OMNIWISE_PASSWORD environment variable."))
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api: ApiConfig::default(),
      cache: CacheConfig::default(),
      submit: SubmitConfig::default(),
      default_course: None,
      title: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_yaml_uses_defaults() {
    let config = Config::from_yaml("api:\n  base_url: https://lms.example.edu/api\n").unwrap();

    assert_eq!(config.api.timeout_secs, 30);
    assert_eq!(config.cache.stale_after(), Duration::from_secs(60));
    assert_eq!(config.cache.gc_after(), Duration::from_secs(300));
    assert_eq!(config.submit.spinner_delay(), Duration::from_millis(2000));
    assert_eq!(config.default_course, None);
  }

  #[test]
  fn test_full_yaml() {
    let yaml = r#"
api:
  base_url: http://localhost:8080
  timeout_secs: 5
cache:
  stale_after_secs: 10
  gc_after_secs: 20
submit:
  spinner_delay_ms: 500
default_course: 3
title: Omniwise (dev)
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.api.timeout(), Duration::from_secs(5));
    assert_eq!(config.cache.stale_after_secs, 10);
    assert_eq!(config.submit.spinner_delay_ms, 500);
    assert_eq!(config.default_course, Some(3));
    assert_eq!(config.display_title(), "Omniwise (dev)");
  }

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let api = ApiConfig {
      base_url: "https://lms.example.edu/api".to_string(),
      ..ApiConfig::default()
    };
    let url = api.base_url().unwrap();
    assert_eq!(url.as_str(), "https://lms.example.edu/api/");
    assert_eq!(
      url.join("courses/3").unwrap().as_str(),
      "https://lms.example.edu/api/courses/3"
    );
  }

  #[test]
  fn test_missing_base_url_is_an_error() {
    let api = ApiConfig::default();
    assert!(api.base_url().is_err());
  }

  #[test]
  fn test_invalid_base_url_is_an_error() {
    let api = ApiConfig {
      base_url: "not a url".to_string(),
      ..ApiConfig::default()
    };
    assert!(api.base_url().is_err());
  }

  #[test]
  fn test_title_falls_back_to_host() {
    let config = Config::from_yaml("api:\n  base_url: https://lms.example.edu/api\n").unwrap();
    assert_eq!(config.display_title(), "lms.example.edu");
  }
}
