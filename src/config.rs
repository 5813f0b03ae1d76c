use crate::error::RelayError;
use crate::relay::RetryPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_FILE: &str = ".env";
const INFO_ENV_VAR: &str = "INFO_JSON";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitterConfig {
    #[serde(default = "default_twitter_api_base")]
    pub api_base: String,
    /// Statuses fetched on the first poll of a route with no cursor.
    #[serde(default = "default_backfill_count")]
    pub backfill_count: u32,
}

fn default_twitter_api_base() -> String {
    "https://api.twitter.com".to_string()
}
fn default_backfill_count() -> u32 { 100 }

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_base: default_twitter_api_base(),
            backfill_count: default_backfill_count(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self { api_base: default_discord_api_base() }
    }
}

/// A Twitter list relayed into a Discord channel.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct RouteConfig {
    pub list_id: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_interval_s")]
    pub interval_s: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_interval_s() -> u64 { 60 }
fn default_request_timeout_ms() -> u64 { 10_000 }

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_s: default_interval_s(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 { 1_000 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_max_attempts() -> u32 { 5 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    /// Seed a missing cursor from the last message in the channel.
    #[serde(default = "default_recover_from_channel")]
    pub recover_from_channel: bool,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_recover_from_channel() -> bool { true }

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            recover_from_channel: default_recover_from_channel(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FormatConfig {
    #[serde(default)]
    pub include_text: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_info_file")]
    pub info_file: PathBuf,
}

fn default_info_file() -> PathBuf {
    PathBuf::from("info.json")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self { info_file: default_info_file() }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.routes.is_empty() {
            return Err(RelayError::Config("at least one [[routes]] entry is required".to_string()));
        }
        let mut seen = HashSet::new();
        for route in &self.routes {
            if route.list_id.trim().is_empty() || route.channel_id.trim().is_empty() {
                return Err(RelayError::Config(
                    "routes need a non-empty list_id and channel_id".to_string(),
                ));
            }
            if !seen.insert(route) {
                return Err(RelayError::Config(format!(
                    "duplicate route {} -> {}",
                    route.list_id, route.channel_id
                )));
            }
        }
        if self.poll.interval_s == 0 {
            return Err(RelayError::Config("poll.interval_s must be > 0".to_string()));
        }
        if self.poll.request_timeout_ms == 0 {
            return Err(RelayError::Config("poll.request_timeout_ms must be > 0".to_string()));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(RelayError::Config("dispatch.max_attempts must be > 0".to_string()));
        }
        if self.dispatch.base_delay_ms == 0 {
            return Err(RelayError::Config("dispatch.base_delay_ms must be > 0".to_string()));
        }
        if self.dispatch.base_delay_ms > self.dispatch.max_delay_ms {
            return Err(RelayError::Config(
                "dispatch.base_delay_ms must not exceed dispatch.max_delay_ms".to_string(),
            ));
        }
        if self.twitter.backfill_count == 0 {
            return Err(RelayError::Config("twitter.backfill_count must be > 0".to_string()));
        }
        Ok(())
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        // Strip BOM if present (common on Windows-created files)
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        for line in content.lines() {
            let line = line.trim().trim_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}

/// API secrets, in the `info.json` layout:
/// `{"discord": {"botToken"}, "twitter": {"apiKey", "apiSecretKey", "accessToken", "accessTokenSecret"}}`.
#[derive(Debug, Deserialize, Clone)]
pub struct Credentials {
    pub discord: DiscordCredentials,
    pub twitter: TwitterCredentials,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiscordCredentials {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TwitterCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret_key: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
}

impl Credentials {
    /// Read `info_file` if it exists, otherwise the `INFO_JSON` environment
    /// variable. Fails if neither is present or any field is empty.
    pub fn load(info_file: &Path) -> Result<Self, RelayError> {
        let raw = match std::fs::read_to_string(info_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match std::env::var(INFO_ENV_VAR) {
                Ok(v) if !v.trim().is_empty() => v,
                _ => {
                    return Err(RelayError::Config(format!(
                        "{} must exist, or the {} environment variable must be set",
                        info_file.display(),
                        INFO_ENV_VAR
                    )))
                }
            },
            Err(e) => {
                return Err(RelayError::Config(format!(
                    "failed to read {}: {}",
                    info_file.display(),
                    e
                )))
            }
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let mut creds: Credentials = serde_json::from_str(raw)
            .map_err(|e| RelayError::Config(format!("invalid credentials JSON: {}", e)))?;
        creds.sanitize();
        creds.validate()?;
        Ok(creds)
    }

    fn sanitize(&mut self) {
        for value in [
            &mut self.discord.bot_token,
            &mut self.twitter.api_key,
            &mut self.twitter.api_secret_key,
            &mut self.twitter.access_token,
            &mut self.twitter.access_token_secret,
        ] {
            *value = sanitize_key(value);
        }
    }

    fn validate(&self) -> Result<(), RelayError> {
        let fields = [
            ("discord.botToken", &self.discord.bot_token),
            ("twitter.apiKey", &self.twitter.api_key),
            ("twitter.apiSecretKey", &self.twitter.api_secret_key),
            ("twitter.accessToken", &self.twitter.access_token),
            ("twitter.accessTokenSecret", &self.twitter.access_token_secret),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(RelayError::Config(format!(
                "missing or empty credential(s): {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// Strip carriage returns, BOM, and other invisible chars from a key/path value.
fn sanitize_key(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}
