//! Configuration loader and validator for the relay.
use crate::delivery::{DEFAULT_MEDIA_TIMEOUT, DEFAULT_TEXT_TIMEOUT};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

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
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub site: Site,
}

/// Storage and run pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub data_dir: String,
    pub retention_days: u64,
    pub pace_min_secs: u64,
    pub pace_max_secs: u64,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            retention_days: 7,
            pace_min_secs: 3,
            pace_max_secs: 8,
        }
    }
}

/// Telegram bot credentials and destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: String,
    /// Numeric chat id or `@channelusername`.
    pub chat_id: String,
    pub text_timeout_secs: u64,
    pub media_timeout_secs: u64,
}

impl Default for Telegram {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            text_timeout_secs: DEFAULT_TEXT_TIMEOUT.as_secs(),
            media_timeout_secs: DEFAULT_MEDIA_TIMEOUT.as_secs(),
        }
    }
}

/// News site endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Site {
    pub base_url: String,
    pub listing_path: String,
    pub timeout_secs: u64,
    pub user_agents_file: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            base_url: "https://www.zaobao.com.sg".into(),
            listing_path: "/realtime".into(),
            timeout_secs: 15,
            user_agents_file: "ua.json".into(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite location inside the data directory.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/sent_news.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.app.retention_days as i64)
    }

    pub fn pace_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.app.pace_min_secs),
            Duration::from_secs(self.app.pace_max_secs),
        )
    }

    /// Let `BOT_ID` / `CHAT_ID` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("BOT_ID").ok(),
            std::env::var("CHAT_ID").ok(),
        );
    }

    fn apply_overrides(&mut self, bot_token: Option<String>, chat_id: Option<String>) {
        if let Some(token) = bot_token.filter(|v| !v.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(chat) = chat_id.filter(|v| !v.trim().is_empty()) {
            self.telegram.chat_id = chat;
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory
///   and falls back to built-in defaults when that file does not exist.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(p) => parse_file(p)?,
        None => {
            let p = Path::new(DEFAULT_CONFIG_PATH);
            if p.exists() {
                parse_file(p)?
            } else {
                Config::default()
            }
        }
    };
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

fn parse_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.retention_days == 0 {
        return Err(ConfigError::Invalid("app.retention_days must be > 0"));
    }
    if cfg.app.pace_min_secs > cfg.app.pace_max_secs {
        return Err(ConfigError::Invalid(
            "app.pace_min_secs must not exceed app.pace_max_secs",
        ));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "telegram.bot_token must be non-empty (or set BOT_ID)",
        ));
    }
    if cfg.telegram.chat_id.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "telegram.chat_id must be non-empty (or set CHAT_ID)",
        ));
    }
    if cfg.telegram.text_timeout_secs == 0 || cfg.telegram.media_timeout_secs == 0 {
        return Err(ConfigError::Invalid("telegram timeouts must be > 0"));
    }

    if cfg.site.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("site.base_url must be non-empty"));
    }
    match Url::parse(&cfg.site.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => {
            return Err(ConfigError::Invalid(
                "site.base_url must be an absolute http(s) URL",
            ))
        }
    }
    if !cfg.site.listing_path.starts_with('/') {
        return Err(ConfigError::Invalid("site.listing_path must start with '/'"));
    }
    if cfg.site.timeout_secs == 0 {
        return Err(ConfigError::Invalid("site.timeout_secs must be > 0"));
    }

    Ok(())
}

/// Sample configuration file.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  retention_days: 7
  pace_min_secs: 3
  pace_max_secs: 8

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  chat_id: "@your_channel"
  text_timeout_secs: 10
  media_timeout_secs: 20

site:
  base_url: "https://www.zaobao.com.sg"
  listing_path: "/realtime"
  timeout_secs: 15
  user_agents_file: "ua.json"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.telegram.chat_id, "@your_channel");
        assert_eq!(cfg.retention(), chrono::Duration::days(7));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("telegram:\n  bot_token: t\n  chat_id: \"-100\"\n").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app, App::default());
        assert_eq!(cfg.site.listing_path, "/realtime");
        assert_eq!(cfg.telegram.text_timeout_secs, 10);
        assert_eq!(cfg.telegram.media_timeout_secs, 20);
    }

    #[test]
    fn missing_credentials_rejected() {
        let cfg = Config::default();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")),
            _ => panic!("wrong error"),
        }

        let mut cfg = Config::default();
        cfg.telegram.bot_token = "token".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.chat_id")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn env_values_override_file() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_overrides(Some("env-token".into()), Some("  ".into()));
        assert_eq!(cfg.telegram.bot_token, "env-token");
        assert_eq!(cfg.telegram.chat_id, "@your_channel");
    }

    #[test]
    fn inverted_pace_window_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.pace_min_secs = 9;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.retention_days = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_base_url_rejected() {
        for bad in ["not a url", "ftp://www.zaobao.com.sg", "/realtime"] {
            let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
            cfg.site.base_url = bad.into();
            match validate(&cfg) {
                Err(ConfigError::Invalid(msg)) => assert!(msg.contains("site.base_url")),
                other => panic!("expected invalid base_url for {bad}, got {other:?}"),
            }
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert!(cfg.database_url().ends_with("/data/sent_news.db"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.site.timeout_secs, 15);
    }

    #[test]
    fn load_missing_explicit_file_fails() {
        let td = tempdir().unwrap();
        let p = td.path().join("absent.yaml");
        assert!(matches!(load(Some(&p)), Err(ConfigError::Io(_))));
    }
}
