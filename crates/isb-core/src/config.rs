//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. environment variables
//! 2. the `irc-slack-bridge.toml` config file (or an explicit path)
//! 3. defaults
//!
//! `${VAR_NAME}` inside the config file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "irc-slack-bridge.toml";

/// Main configuration for the bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener and IRC-side settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Slack-side settings
    #[serde(default)]
    pub slack: SlackConfig,
}

/// Listener and IRC-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the listener binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prefix used for server-originated IRC lines
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Default log filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            server_name: default_server_name(),
            log_level: default_log_level(),
        }
    }
}

/// Slack-side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Web API base URL (no trailing slash)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Extra attempts for calls that tolerate retrying
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Pause after each read-marker flush
    #[serde(default = "default_mark_cooldown_secs")]
    pub mark_cooldown_secs: u64,

    /// Bot ids whose attachment fallback text is relayed as a message
    #[serde(default)]
    pub relay_bot_ids: Vec<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            retries: default_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            mark_cooldown_secs: default_mark_cooldown_secs(),
            relay_bot_ids: Vec::new(),
        }
    }
}

impl SlackConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mark_cooldown(&self) -> Duration {
        Duration::from_secs(self.mark_cooldown_secs)
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    12345
}

fn default_server_name() -> String {
    "irc-slack-bridge".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_mark_cooldown_secs() -> u64 {
    5
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next(); // consume '{'

            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }

            if let Ok(env_value) = std::env::var(&var_name) {
                result.push_str(&env_value);
            }
        }

        result
    }

    /// Load settings from a TOML file, then apply environment overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let expanded_content = Self::expand_env_vars(&toml_content);
        let toml_config: TomlConfig = toml::from_str(&expanded_content)?;

        let mut cfg = Self::from_toml_config(toml_config);
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load settings from the default file if present, else from the environment only.
    pub fn load() -> crate::Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Ok(Self::from_env())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let server = toml.server.unwrap_or_default();
        let slack = toml.slack.unwrap_or_default();

        Config {
            server: ServerConfig {
                listen_addr: server.listen_addr.unwrap_or_else(default_listen_addr),
                port: server.port.unwrap_or_else(default_port),
                server_name: server.server_name.unwrap_or_else(default_server_name),
                log_level: server.log_level.unwrap_or_else(default_log_level),
            },
            slack: SlackConfig {
                api_base_url: slack.api_base_url.unwrap_or_else(default_api_base_url),
                retries: slack.retries.unwrap_or_else(default_retries),
                request_timeout_secs: slack
                    .request_timeout_secs
                    .unwrap_or_else(default_request_timeout_secs),
                mark_cooldown_secs: slack
                    .mark_cooldown_secs
                    .unwrap_or_else(default_mark_cooldown_secs),
                relay_bot_ids: slack.relay_bot_ids.unwrap_or_default(),
            },
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("ISB_LISTEN_ADDR") {
            if !addr.is_empty() {
                self.server.listen_addr = addr;
            }
        }
        if let Ok(port) = std::env::var("ISB_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(name) = std::env::var("ISB_SERVER_NAME") {
            if !name.is_empty() {
                self.server.server_name = name;
            }
        }
        if let Ok(level) = std::env::var("ISB_LOG_LEVEL") {
            if !level.is_empty() {
                self.server.log_level = level;
            }
        }

        if let Ok(base_url) = std::env::var("SLACK_API_BASE_URL") {
            if !base_url.is_empty() {
                self.slack.api_base_url = base_url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(retries) = std::env::var("SLACK_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.slack.retries = r;
            }
        }
        if let Ok(secs) = std::env::var("SLACK_REQUEST_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.slack.request_timeout_secs = s;
            }
        }
        if let Ok(secs) = std::env::var("SLACK_MARK_COOLDOWN_SECS") {
            if let Ok(s) = secs.parse() {
                self.slack.mark_cooldown_secs = s;
            }
        }
        if let Ok(ids) = std::env::var("SLACK_RELAY_BOT_IDS") {
            self.slack.relay_bot_ids = ids
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    slack: Option<TomlSlackConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    #[serde(default)]
    listen_addr: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSlackConfig {
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    retries: Option<u32>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    mark_cooldown_secs: Option<u64>,
    #[serde(default)]
    relay_bot_ids: Option<Vec<String>>,
}
