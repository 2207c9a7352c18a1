//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use keel_framework::PluginsConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Smallest registration timeout the bootstrapper accepts, in milliseconds.
pub const MIN_REGISTER_TIMEOUT_MS: u64 = 3000;

/// Root configuration structure.
///
/// Keys the bootstrapper does not know about are kept in `extra` and stay
/// visible to plugins through the merged configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeelConfig {
    /// Where the server listens.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Implementation-specific server settings, handed to the server factory.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub server: Value,

    /// The plugins mapping.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Bootstrapper settings.
    #[serde(default)]
    pub keel: KeelSettings,

    /// Logging subscriber settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Everything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Connection
// =============================================================================

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Host name for the public URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Address to bind.
    #[serde(default = "default_address")]
    pub address: String,

    /// Port to bind; 0 picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ConnectionConfig {
    /// Defaults taken from `HOST`, `HOST_IP` and `PORT`.
    pub fn from_process_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").filter(|host| !host.is_empty()),
            address: lookup("HOST_IP")
                .filter(|ip| !ip.is_empty())
                .unwrap_or(defaults.address),
            port: lookup("PORT")
                .and_then(|port| port.trim().parse().ok())
                .unwrap_or(defaults.port),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            address: default_address(),
            port: default_port(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

// =============================================================================
// Bootstrapper
// =============================================================================

/// The `keel` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeelSettings {
    /// Per-plugin registration timeout in milliseconds.
    #[serde(default = "default_register_timeout")]
    pub register_plugins_timeout: u64,

    /// Lifecycle event timeout in milliseconds; 0 disables it.
    #[serde(default)]
    pub event_timeout: u64,

    /// Log level (trace, debug, info, warn, error, none).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Skip the "server running" banner.
    #[serde(default)]
    pub suppress_startup_banner: bool,

    /// Deployment name; the active profile when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
}

impl KeelSettings {
    /// The registration timeout, never below [`MIN_REGISTER_TIMEOUT_MS`].
    pub fn register_timeout(&self) -> Duration {
        Duration::from_millis(self.register_plugins_timeout.max(MIN_REGISTER_TIMEOUT_MS))
    }

    /// The event timeout, if enabled.
    pub fn event_timeout(&self) -> Option<Duration> {
        (self.event_timeout > 0).then(|| Duration::from_millis(self.event_timeout))
    }

    /// The parsed log level. Unknown names fall back to `info`; validation
    /// rejects them before this is reached.
    pub fn log_level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or_default()
    }
}

impl Default for KeelSettings {
    fn default() -> Self {
        Self {
            register_plugins_timeout: default_register_timeout(),
            event_timeout: 0,
            log_level: default_log_level(),
            suppress_startup_banner: false,
            deployment: None,
        }
    }
}

fn default_register_timeout() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Nothing is logged.
    None,
}

impl LogLevel {
    /// Every accepted level name.
    pub const NAMES: [&'static str; 6] = ["trace", "debug", "info", "warn", "error", "none"];

    /// The level name as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::None => "none",
        }
    }

    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::None => "off",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "none" | "off" => Ok(Self::None),
            _ => Err(format!(
                "Log level must be one of {}. Received \"{s}\".",
                Self::NAMES.join(", ")
            )),
        }
    }
}

/// Output line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires `file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// The `logging` section. The level itself comes from `keel.log_level`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `{ keel_framework = "debug" }`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: KeelConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.connection, ConnectionConfig::default());
        assert_eq!(config.connection.address, "0.0.0.0");
        assert_eq!(config.connection.port, 3000);
        assert_eq!(config.keel.register_plugins_timeout, 5000);
        assert_eq!(config.keel.event_timeout(), None);
        assert_eq!(config.keel.log_level(), LogLevel::Info);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_register_timeout_floor() {
        let mut settings = KeelSettings::default();
        assert_eq!(settings.register_timeout(), Duration::from_millis(5000));
        settings.register_plugins_timeout = 100;
        assert_eq!(settings.register_timeout(), Duration::from_millis(3000));
        settings.register_plugins_timeout = 20_000;
        assert_eq!(settings.register_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_unknown_keys_kept() {
        let config: KeelConfig = serde_json::from_value(json!({
            "keel": { "event_timeout": 250 },
            "webapp": { "paths": ["/a"] },
        }))
        .unwrap();
        assert_eq!(config.keel.event_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.extra["webapp"], json!({ "paths": ["/a"] }));
    }

    #[test]
    fn test_connection_from_lookup() {
        let env = HashMap::from([("HOST_IP", "127.0.0.1"), ("PORT", "8080"), ("HOST", "")]);
        let connection = ConnectionConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(connection.address, "127.0.0.1");
        assert_eq!(connection.port, 8080);
        assert_eq!(connection.host, None);

        let bad_port = ConnectionConfig::from_lookup(|key| (key == "PORT").then(|| "x".into()));
        assert_eq!(bad_port.port, 3000);
    }

    #[test]
    fn test_log_level_names() {
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(LogLevel::None.as_directive(), "off");
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.contains("trace, debug, info, warn, error, none"));
    }
}
