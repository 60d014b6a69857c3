//! Configuration loader and validator for the Qiita→Crowi migration.
//!
//! Settings come from an optional YAML file; command-line flags override
//! individual values before validation.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub crowi: Crowi,
    pub qiita: Qiita,
    pub migration: Migration,
    pub http: Http,
    pub retry: Retry,
}

/// Destination wiki settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Crowi {
    pub url: String,
    pub access_token: String,
}

/// Source platform settings used when downloading embedded images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Qiita {
    /// Bearer token for team-private image URLs.
    pub token: Option<String>,
    /// Storage hosts that never receive the bearer token.
    pub trusted_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Migration {
    pub page_path: String,
    pub concurrency: usize,
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Http {
    pub timeout_secs: u64,
}

/// Network-layer retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for Qiita {
    fn default() -> Self {
        Self {
            token: None,
            trusted_hosts: vec!["amazonaws.com".to_string()],
        }
    }
}

impl Default for Migration {
    fn default() -> Self {
        Self {
            page_path: "/qiita".to_string(),
            concurrency: 4,
            work_dir: PathBuf::from("./qiita-assets"),
        }
    }
}

impl Default for Http {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Http {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Retry {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// A policy that gives up on the first failure.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub crowi_url: Option<String>,
    pub access_token: Option<String>,
    pub page_path: Option<String>,
    pub qiita_token: Option<String>,
    pub concurrency: Option<usize>,
    pub work_dir: Option<PathBuf>,
}

impl Config {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.crowi_url {
            self.crowi.url = url;
        }
        if let Some(token) = overrides.access_token {
            self.crowi.access_token = token;
        }
        if let Some(page_path) = overrides.page_path {
            self.migration.page_path = page_path;
        }
        if let Some(token) = overrides.qiita_token.filter(|t| !t.trim().is_empty()) {
            self.qiita.token = Some(token);
        }
        if let Some(concurrency) = overrides.concurrency {
            self.migration.concurrency = concurrency;
        }
        if let Some(work_dir) = overrides.work_dir {
            self.migration.work_dir = work_dir;
        }
    }

    /// Ensure the artifact directory exists (creates `migration.work_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        fs::create_dir_all(&self.migration.work_dir)
    }
}

/// Parse a YAML file. `None` yields the built-in defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Load, apply command-line overrides, then validate.
pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Config, ConfigError> {
    let mut cfg = load(path)?;
    cfg.apply(overrides);
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.crowi.url.trim().is_empty() {
        return Err(ConfigError::Invalid("crowi.url must be non-empty"));
    }
    match Url::parse(&cfg.crowi.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return Err(ConfigError::Invalid("crowi.url must be an http(s) URL")),
    }
    if cfg.crowi.access_token.trim().is_empty() {
        return Err(ConfigError::Invalid("crowi.access_token must be non-empty"));
    }

    if !cfg.migration.page_path.starts_with('/') {
        return Err(ConfigError::Invalid("migration.page_path must be absolute"));
    }
    if cfg.migration.concurrency == 0 {
        return Err(ConfigError::Invalid("migration.concurrency must be > 0"));
    }
    if cfg.migration.work_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("migration.work_dir must be non-empty"));
    }

    if cfg.http.timeout_secs == 0 {
        return Err(ConfigError::Invalid("http.timeout_secs must be > 0"));
    }
    if cfg.retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::Invalid("retry.backoff_multiplier must be >= 1.0"));
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"crowi:
  url: "https://wiki.example.com"
  access_token: "YOUR_CROWI_ACCESS_TOKEN"

qiita:
  token: null
  trusted_hosts:
    - "amazonaws.com"

migration:
  page_path: "/qiita"
  concurrency: 4
  work_dir: "./qiita-assets"

http:
  timeout_secs: 60

retry:
  max_attempts: 3
  initial_delay_ms: 500
  max_delay_ms: 10000
  backoff_multiplier: 2.0
"#
}
