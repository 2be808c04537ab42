//! Configuration file parsing and structures.
//!
//! ha-bridge reads a single TOML file with a `[bridge]` table describing the
//! backend to follow and an optional `[logging]` table.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use crate::error::BridgeError;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, keyed by module path (e.g. "ha_bridge::bridge")
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a per-target filter from the default level and overrides.
    pub fn filter(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_reconnect_backoff_secs() -> u64 {
    5
}

/// Where the bridge finds its backend and how it paces reconnects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Base URL of the editor backend (e.g., "http://localhost:8080").
    /// The event stream uses `ws://` for `http` and `wss://` for `https`.
    pub base_url: String,

    /// Seconds to wait for the event stream to open
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds to wait before reconnecting after the stream closes
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Optional bearer token sent with REST requests
    #[serde(default)]
    pub access_token: Option<String>,
}

impl BridgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            access_token: None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    fn base(&self) -> Result<Url, BridgeError> {
        Url::parse(&self.base_url).map_err(|e| self.invalid(e.to_string()))
    }

    fn invalid(&self, message: impl Into<String>) -> BridgeError {
        BridgeError::InvalidUrl {
            url: self.base_url.clone(),
            message: message.into(),
        }
    }

    /// URL of the state snapshot endpoint.
    pub fn states_url(&self) -> Result<Url, BridgeError> {
        self.base()?
            .join("/api/states")
            .map_err(|e| self.invalid(e.to_string()))
    }

    /// URL of the action catalog endpoint.
    pub fn actions_url(&self) -> Result<Url, BridgeError> {
        self.base()?
            .join("/api/actions")
            .map_err(|e| self.invalid(e.to_string()))
    }

    /// URL of the live event stream, on the same host as the REST API.
    pub fn ws_url(&self) -> Result<Url, BridgeError> {
        let mut url = self.base()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(self.invalid(format!("unsupported scheme '{}'", other))),
        };
        url.set_scheme(scheme)
            .map_err(|()| self.invalid(format!("cannot switch to '{}'", scheme)))?;
        url.set_path("/ws");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
