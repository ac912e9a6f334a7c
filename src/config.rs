//! Configuration loader and validator for the selection staging pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::status::LogSources;

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
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub store: Store,
    #[serde(default)]
    pub content_api: Option<ContentApi>,
    #[serde(default)]
    pub reconcile: Reconcile,
    pub pipeline: Pipeline,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub checkpoint_path: String,
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Which backend answers authoritative article lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Sqlite,
    ContentApi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub kind: StoreKind,
    #[serde(default)]
    pub database_url: Option<String>,
}

/// External content API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentApi {
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

/// Matching thresholds for the fuzzy strategies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconcile {
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default = "default_min_token_score")]
    pub min_token_score: usize,
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            min_token_score: default_min_token_score(),
        }
    }
}

/// Pipeline log, summary and attach-runner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipeline {
    pub log_dir: String,
    pub stream_log: String,
    pub fallback_log: String,
    pub summary_dir: String,
    #[serde(default = "default_summary_prefix")]
    pub summary_prefix: String,
    #[serde(default)]
    pub attach_command: Vec<String>,
    #[serde(default = "default_attach_timeout")]
    pub attach_timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8787".into()
}

fn default_api_timeout() -> u64 {
    15
}

fn default_min_token_len() -> usize {
    3
}

fn default_min_token_score() -> usize {
    2
}

fn default_summary_prefix() -> String {
    "pipeline-summary".into()
}

fn default_attach_timeout() -> u64 {
    120
}

impl Config {
    /// Ensure required directories exist (data dir, log dir and summary dir).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [
            &self.app.data_dir,
            &self.pipeline.log_dir,
            &self.pipeline.summary_dir,
        ] {
            if dir.trim().is_empty() {
                continue;
            }
            fs::create_dir_all(expand_home(dir))?;
        }
        Ok(())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.app.checkpoint_path))
    }

    /// SQLite URL for the authoritative store. `DATABASE_URL` wins over the
    /// configured value; falls back to `articles.db` under the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            self.store.database_url.clone().unwrap_or_else(|| {
                format!("sqlite://{}/articles.db", expand_home(&self.app.data_dir))
            })
        })
    }

    pub fn log_sources(&self) -> LogSources {
        let dir = PathBuf::from(expand_home(&self.pipeline.log_dir));
        LogSources {
            preferred: dir.join(&self.pipeline.stream_log),
            fallback: dir.join(&self.pipeline.fallback_log),
        }
    }

    pub fn summary_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.pipeline.summary_dir))
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.attach_timeout_secs)
    }
}

/// Expand a leading `~/` using `$HOME`; other paths are returned unchanged.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{}", home.trim_end_matches('/'), rest);
        }
    }
    path.to_string()
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
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.checkpoint_path.trim().is_empty() {
        return Err(ConfigError::Invalid("app.checkpoint_path must be non-empty"));
    }
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }

    match cfg.store.kind {
        StoreKind::Sqlite => {
            if let Some(url) = &cfg.store.database_url {
                if url.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "store.database_url must be non-empty when set",
                    ));
                }
            }
        }
        StoreKind::ContentApi => {
            let Some(api) = &cfg.content_api else {
                return Err(ConfigError::Invalid(
                    "content_api section is required when store.kind is content_api",
                ));
            };
            if api.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("content_api.base_url must be non-empty"));
            }
            if api.token.trim().is_empty() {
                return Err(ConfigError::Invalid("content_api.token must be non-empty"));
            }
        }
    }
    if let Some(api) = &cfg.content_api {
        if api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("content_api.timeout_secs must be > 0"));
        }
    }

    if cfg.reconcile.min_token_len == 0 {
        return Err(ConfigError::Invalid("reconcile.min_token_len must be > 0"));
    }
    if cfg.reconcile.min_token_score == 0 {
        return Err(ConfigError::Invalid("reconcile.min_token_score must be > 0"));
    }

    let p = &cfg.pipeline;
    if p.log_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("pipeline.log_dir must be non-empty"));
    }
    if p.stream_log.trim().is_empty() {
        return Err(ConfigError::Invalid("pipeline.stream_log must be non-empty"));
    }
    if p.fallback_log.trim().is_empty() {
        return Err(ConfigError::Invalid("pipeline.fallback_log must be non-empty"));
    }
    if p.summary_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("pipeline.summary_dir must be non-empty"));
    }
    if p.attach_timeout_secs == 0 {
        return Err(ConfigError::Invalid("pipeline.attach_timeout_secs must be > 0"));
    }
    if p.attach_command.iter().any(|part| part.trim().is_empty()) {
        return Err(ConfigError::Invalid(
            "pipeline.attach_command must not contain empty arguments",
        ));
    }

    Ok(())
}

/// Reference configuration used by tests and as a starting template.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  checkpoint_path: "./data/selected-articles.json"
  bind: "127.0.0.1:8787"

store:
  kind: sqlite
  database_url: "sqlite://./data/articles.db"

content_api:
  base_url: "https://cms.example.com/"
  token: "YOUR_CONTENT_API_TOKEN"
  timeout_secs: 15

reconcile:
  min_token_len: 3
  min_token_score: 2

pipeline:
  log_dir: "./data/logs"
  stream_log: "attach-stream.log"
  fallback_log: "attach.log"
  summary_dir: "./data/summaries"
  summary_prefix: "pipeline-summary"
  attach_command:
    - "node"
    - "scripts/attach-selected.js"
  attach_timeout_secs: 120
"#
}
