//! Configuration module for the Keel runtime.
//!
//! This module composes layered configuration (defaults, TOML files,
//! environment, programmatic fragments) into one JSON value and validates its
//! typed view.

pub mod error;
pub mod fragment;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use fragment::ConfigFragment;
pub use loader::{
    ComposedConfig, ConfigLoader, ENV_PREFIX, Profile, load_config, load_config_from_file,
    merge_values,
};
pub use schema::{
    ConnectionConfig, KeelConfig, KeelSettings, LogFormat, LogLevel, LogOutput, LoggingConfig,
    MIN_REGISTER_TIMEOUT_MS, SpanEventConfig,
};
pub use validation::validate_config;
