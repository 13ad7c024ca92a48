//! Configuration loader and validator for the outbox processor binary.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest accepted lease: one week.
pub const MAX_CLAIM_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub database: Database,
    pub processor: Processor,
    pub demo: Demo,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

/// Claim/publish loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Processor {
    /// Empty means derive one from `HOSTNAME`, else a random uuid.
    #[serde(default)]
    pub id: String,
    pub claim_duration_ms: u64,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

/// Demo writer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Demo {
    pub write_interval_ms: u64,
    pub messages_per_write: usize,
}

impl Config {
    /// `DATABASE_URL` wins over the file.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn claim_duration(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.processor.claim_duration_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .ok_or(ConfigError::Invalid("processor.claim_duration_ms is out of range"))
    }

    pub fn processor_id(&self) -> String {
        let configured = self.processor.id.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| format!("processor-{}", uuid::Uuid::new_v4()))
    }

    /// Create the parent directory of a file-backed SQLite database.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        create_parent_dir(&self.database_url())
    }
}

fn create_parent_dir(url: &str) -> Result<(), std::io::Error> {
    match sqlite_file_path(url).and_then(|p| p.parent().map(Path::to_path_buf)) {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Filesystem path of a `sqlite:` URL, with a leading `~/` expanded.
/// `None` for in-memory and non-sqlite URLs.
pub fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite:")?;
    if rest.starts_with(":memory") {
        return None;
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split_once('?').map_or(rest, |(p, _)| p);
    if path.is_empty() {
        return None;
    }
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => Some(Path::new(home.trim_end_matches('/')).join(tail)),
        _ => Some(PathBuf::from(path)),
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.database.url.trim().is_empty() {
        return Err(ConfigError::Invalid("database.url must be non-empty"));
    }
    if cfg.database.max_connections == 0 {
        return Err(ConfigError::Invalid("database.max_connections must be > 0"));
    }
    if cfg.processor.claim_duration_ms == 0 {
        return Err(ConfigError::Invalid("processor.claim_duration_ms must be > 0"));
    }
    if cfg.processor.claim_duration_ms > MAX_CLAIM_DURATION_MS {
        return Err(ConfigError::Invalid(
            "processor.claim_duration_ms must be <= 604800000 (one week)",
        ));
    }
    if cfg.processor.batch_size == 0 {
        return Err(ConfigError::Invalid("processor.batch_size must be > 0"));
    }
    if cfg.processor.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("processor.poll_interval_ms must be > 0"));
    }
    if cfg.demo.write_interval_ms == 0 {
        return Err(ConfigError::Invalid("demo.write_interval_ms must be > 0"));
    }
    Ok(())
}

/// Example YAML accepted by [`load`].
pub fn example() -> &'static str {
    r#"database:
  url: "sqlite://./data/outbox.db"
  max_connections: 5
  busy_timeout_ms: 5000

processor:
  id: ""
  claim_duration_ms: 10000
  batch_size: 100
  poll_interval_ms: 500

demo:
  write_interval_ms: 5000
  messages_per_write: 10
"#
}
