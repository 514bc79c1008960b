//! Configuration loader and validator for the GitHub→Telegram release bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
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

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub github: Github,
    pub telegram: Telegram,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub database_url: String,
    /// Cadence of the repository release poller.
    pub poll_interval_secs: u64,
    /// Cadence of the starred-repositories poller.
    pub star_poll_interval_secs: u64,
    /// Upper bound on a single GitHub or Telegram call.
    pub request_timeout_secs: u64,
    /// When true, pre-releases are announced like regular releases.
    #[serde(default)]
    pub process_pre_releases: bool,
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Github {
    /// Personal access token; empty means unauthenticated (low rate limit).
    #[serde(default)]
    pub token: String,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
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
    if cfg.app.database_url.trim().is_empty() {
        return Err(ConfigError::Invalid("app.database_url must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.star_poll_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "app.star_poll_interval_secs must be > 0",
        ));
    }
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, kept in sync with the schema above.
pub fn example() -> &'static str {
    r#"app:
  database_url: "sqlite://./data/release-bot.db"
  poll_interval_secs: 3600
  star_poll_interval_secs: 28800
  request_timeout_secs: 30
  process_pre_releases: false

github:
  token: ""

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
"#
}
