//! Configuration loader.
//!
//! Configuration is composed as JSON, lowest to highest precedence:
//!
//! 1. Built-in defaults (`HOST`, `HOST_IP` and `PORT` seed the connection)
//! 2. `default.toml` then `<profile>.toml` from each search directory
//! 3. An explicit file, if one is set
//! 4. Environment variables (`KEEL_*`)
//! 5. Programmatic layers, in the order they were merged
//!
//! Objects merge deeply; arrays and scalars replace. Key order is kept, so
//! the plugins mapping stays in the order its sources wrote it.
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `KEEL_` prefix with `__` as
//! separator:
//!
//! - `KEEL_KEEL__LOG_LEVEL=debug` → `keel.log_level = "debug"`
//! - `KEEL_CONNECTION__PORT=8080` → `connection.port = 8080`
//! - `KEEL_PLUGINS__AUTH__ENABLE=false` → `plugins.auth.enable = false`
//!
//! `KEEL_PROFILE`, `KEEL_ENV` and `KEEL_INSPECT` select behavior and are not
//! configuration keys.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_runtime::config::ConfigLoader;
//!
//! let composed = ConfigLoader::new()
//!     .profile("production")
//!     .merge(serde_json::json!({ "connection": { "port": 8080 } }))
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::Figment;
use figment::providers::Env;
use serde_json::Value;
use tracing::{debug, info, trace};

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, KeelConfig};
use super::validation::validate_config;

/// Environment variable prefix for configuration keys.
pub const ENV_PREFIX: &str = "KEEL_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    Staging,
    Production,
    Test,
    Qa,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Profile names that need no warning.
    pub const KNOWN: [&'static str; 5] = ["qa", "development", "staging", "production", "test"];

    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Test => "test",
            Self::Qa => "qa",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name. Names starting with `dev`, `sta` or `pro`
    /// expand to the full profile.
    pub fn parse(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        match lower.as_str() {
            "development" => return Self::Development,
            "staging" => return Self::Staging,
            "production" => return Self::Production,
            "test" => return Self::Test,
            "qa" => return Self::Qa,
            _ => {}
        }
        let expanded = match lower.get(..3) {
            Some("dev") => Self::Development,
            Some("sta") => Self::Staging,
            Some("pro") => Self::Production,
            _ => return Self::Custom(name.trim().to_string()),
        };
        info!(from = %name, to = %expanded, "Expanded profile name");
        expanded
    }

    /// Reads `KEEL_PROFILE`, falling back to `KEEL_ENV`, defaulting to
    /// development.
    pub fn from_env() -> Self {
        std::env::var("KEEL_PROFILE")
            .or_else(|_| std::env::var("KEEL_ENV"))
            .ok()
            .filter(|name| !name.trim().is_empty())
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }

    /// Whether this is one of [`Profile::KNOWN`].
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of loading: the merged JSON and its typed view.
#[derive(Debug, Clone)]
pub struct ComposedConfig {
    /// The profile the files were selected for.
    pub profile: Profile,
    /// The merged configuration, as plugins and listeners see it.
    pub value: Arc<Value>,
    /// The typed view of `value`.
    pub config: KeelConfig,
}

/// Layered configuration loader.
///
/// # Example
///
/// ```rust,ignore
/// let composed = ConfigLoader::new()
///     .search_path("./deploy/config")
///     .without_env()
///     .load()?;
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Configuration profile.
    profile: Profile,
    /// Directories searched for `default.toml` and `<profile>.toml`.
    search_paths: Vec<PathBuf>,
    /// Specific config file merged after the searched ones.
    config_file: Option<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    env_prefix: String,
    /// Programmatic layers.
    layers: Vec<Value>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
            env_prefix: ENV_PREFIX.to_string(),
            layers: Vec::new(),
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds `./config` to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd.join("config"))
        } else {
            self
        }
    }

    /// Adds the user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("keel"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables, including `HOST`, `HOST_IP`
    /// and `PORT`.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides the environment variable prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Merges a programmatic layer on top of everything loaded so far.
    pub fn merge(mut self, layer: Value) -> Self {
        self.layers.push(layer);
        self
    }

    /// The active profile.
    pub fn active_profile(&self) -> &Profile {
        &self.profile
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<ComposedConfig> {
        let profile = self.profile.clone();
        let value = self.compose()?;

        let config: KeelConfig = serde_json::from_value(value.clone())?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            log_level = %config.keel.log_level,
            plugins = config.plugins.len(),
            "Configuration loaded successfully"
        );

        Ok(ComposedConfig {
            profile,
            value: Arc::new(value),
            config,
        })
    }

    /// Merges every source into one JSON value without extracting it.
    pub fn compose(self) -> ConfigResult<Value> {
        let mut merged = serde_json::to_value(self.defaults())?;

        for path in self.config_files()? {
            merge_values(&mut merged, read_toml(&path)?);
        }

        if self.load_env {
            trace!(prefix = %self.env_prefix, "Loading environment variables");
            merge_values(&mut merged, self.env_values()?);
        }

        for layer in self.layers {
            merge_values(&mut merged, layer);
        }

        Ok(merged)
    }

    fn defaults(&self) -> KeelConfig {
        let mut defaults = KeelConfig::default();
        if self.load_env {
            defaults.connection = ConnectionConfig::from_process_env();
        }
        defaults.keel.deployment = Some(self.profile.to_string());
        defaults
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keel"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("config"));
        }
        paths
    }

    /// Files to merge, in precedence order.
    fn config_files(&self) -> ConfigResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in self.resolve_search_paths() {
            for name in ["default.toml".to_string(), format!("{}.toml", self.profile)] {
                let path = dir.join(name);
                if path.is_file() {
                    files.push(path);
                }
            }
        }

        if let Some(path) = &self.config_file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            files.push(path.clone());
        }

        if files.is_empty() {
            debug!("No configuration file found, using defaults");
        }
        Ok(files)
    }

    fn env_values(&self) -> ConfigResult<Value> {
        let env = Env::prefixed(&self.env_prefix)
            .split("__")
            .ignore(&["profile", "env", "inspect"]);
        Figment::from(env)
            .extract()
            .map_err(|e| ConfigError::EnvError(Box::new(e)))
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<ComposedConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from a specific file on top of defaults.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ComposedConfig> {
    ConfigLoader::new().file(path).load()
}

fn read_toml(path: &Path) -> ConfigResult<Value> {
    info!(path = %path.display(), "Loading configuration file");
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merges `overlay` into `base`. Objects merge key by key; anything else
/// replaces.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let composed = ConfigLoader::new()
            .profile("development")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(composed.config.keel.log_level, "info");
        assert_eq!(composed.config.connection.port, 3000);
        assert_eq!(composed.config.keel.deployment.as_deref(), Some("development"));
        assert_eq!(composed.value["connection"]["address"], "0.0.0.0");
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("production"), Profile::Production);
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("DEV"), Profile::Development);
        assert_eq!(Profile::parse("stag"), Profile::Staging);
        assert_eq!(Profile::parse("qa"), Profile::Qa);
        assert_eq!(Profile::parse("perf"), Profile::Custom("perf".into()));
        assert!(!Profile::parse("perf").is_known());
        assert_eq!(Profile::parse("pro").to_string(), "production");
    }

    #[test]
    fn test_merge_values() {
        let mut base = json!({
            "plugins": { "a": { "priority": 1, "options": { "x": 1 } } },
            "list": [1, 2, 3],
        });
        merge_values(
            &mut base,
            json!({
                "plugins": { "a": { "options": { "y": 2 } }, "b": {} },
                "list": [4],
            }),
        );
        assert_eq!(
            base,
            json!({
                "plugins": { "a": { "priority": 1, "options": { "x": 1, "y": 2 } }, "b": {} },
                "list": [4],
            })
        );
    }

    #[test]
    fn test_files_and_layers_precedence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[keel]
log_level = "warn"

[plugins.zeta]
priority = 2

[plugins.alpha]
priority = 1
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("staging.toml"),
            "[connection]\nport = 4000\n\n[plugins.alpha]\nenable = false\n",
        )
        .unwrap();

        let composed = ConfigLoader::new()
            .profile("sta")
            .search_path(dir.path())
            .without_env()
            .merge(json!({ "keel": { "log_level": "error" } }))
            .load()
            .unwrap();

        assert_eq!(composed.profile, Profile::Staging);
        assert_eq!(composed.config.connection.port, 4000);
        assert_eq!(composed.config.keel.log_level, "error");
        let keys: Vec<&str> = composed
            .config
            .plugins
            .entries
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert!(!composed.config.plugins.entries["alpha"].is_enabled());
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .search_path("/nonexistent/keel")
            .file("/nonexistent/keel.toml")
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[keel\n").unwrap();
        let err = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("default.toml"));
    }

    #[test]
    fn test_env_overrides_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[keel]\nevent_timeout = 10\n").unwrap();

        // SAFETY: the prefix is unique to this test
        unsafe {
            std::env::set_var("KEEL_LOADER_TEST_KEEL__EVENT_TIMEOUT", "250");
            std::env::set_var("KEEL_LOADER_TEST_PROFILE", "production");
        }
        let composed = ConfigLoader::new()
            .search_path(dir.path())
            .env_prefix("KEEL_LOADER_TEST_")
            .load()
            .unwrap();
        unsafe {
            std::env::remove_var("KEEL_LOADER_TEST_KEEL__EVENT_TIMEOUT");
            std::env::remove_var("KEEL_LOADER_TEST_PROFILE");
        }

        assert_eq!(composed.config.keel.event_timeout, 250);
        assert!(composed.value.get("profile").is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .merge(json!({ "keel": { "log_level": "chatty" } }))
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}
