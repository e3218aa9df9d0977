//! Configuration loader and validator for the announcement watcher.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
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

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub platform: Platform,
    pub sinks: Sinks,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_minutes: u64,
    #[serde(default)]
    pub paused: bool,
}

/// Remote platform endpoint and credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub base_url: String,
    pub token: String,
    /// Absolute expiry deadline in Unix milliseconds, as reported at token
    /// issuance. Advisory only.
    #[serde(default)]
    pub token_expires_at_ms: Option<i64>,
    #[serde(default)]
    pub tracked_batch_ids: Vec<String>,
}

/// Notification sink credentials. Either sink may be absent; at least one
/// must be real before the watcher starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sinks {
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default)]
    pub telegram: Option<Telegram>,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    pub chat_id: i64,
}

/// True for values the template ships with or that were never filled in.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.starts_with("YOUR_")
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.app.poll_interval_minutes * 60)
    }
}

impl Platform {
    pub fn token_is_placeholder(&self) -> bool {
        is_placeholder(&self.token)
    }
}

impl Sinks {
    /// True when no sink has real credentials yet.
    pub fn none_configured(&self) -> bool {
        let webhook = self
            .discord_webhook_url
            .as_deref()
            .map(|url| !is_placeholder(url))
            .unwrap_or(false);
        let telegram = self
            .telegram
            .as_ref()
            .map(|t| !is_placeholder(&t.bot_token))
            .unwrap_or(false);
        !webhook && !telegram
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

/// Overwrite the tracked-batch selection and persist the whole config back to
/// disk. Used by the watcher to clear a selection the catalog no longer
/// contains, forcing a re-selection on the next start.
pub fn store_tracked_batch_ids(
    path: &Path,
    cfg: &Config,
    ids: &[String],
) -> Result<Config, ConfigError> {
    let mut updated = cfg.clone();
    updated.platform.tracked_batch_ids = ids.to_vec();
    fs::write(path, serde_yaml::to_string(&updated)?)?;
    Ok(updated)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_minutes == 0 {
        return Err(ConfigError::Invalid(
            "app.poll_interval_minutes must be > 0",
        ));
    }

    if cfg.platform.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.base_url must be non-empty"));
    }
    if cfg.platform.token.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.token must be non-empty"));
    }

    if let Some(url) = &cfg.sinks.discord_webhook_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sinks.discord_webhook_url must be non-empty when present",
            ));
        }
    }
    if let Some(telegram) = &cfg.sinks.telegram {
        if telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sinks.telegram.bot_token must be non-empty",
            ));
        }
        if telegram.chat_id == 0 {
            return Err(ConfigError::Invalid("sinks.telegram.chat_id must be set"));
        }
    }

    Ok(())
}

/// Template written on first run.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_minutes: 30
  paused: false

platform:
  base_url: "https://api.penpencil.co"
  token: "YOUR_ACCESS_TOKEN"
  # Absolute expiry deadline in Unix milliseconds, as reported at token
  # issuance. Only feeds an advisory log line at startup.
  token_expires_at_ms: null
  # Fill with ids printed by the list-batches tool.
  tracked_batch_ids: []

sinks:
  discord_webhook_url: "YOUR_DISCORD_WEBHOOK"
  telegram:
    bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
    chat_id: 123456789
"#
}
