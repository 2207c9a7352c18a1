//! Keel Runtime - configuration, logging and the bootstrap sequence.
//!
//! This crate provides:
//! - Layered configuration composition (`ConfigLoader`, `ConfigFragment`)
//! - Logging configuration (`LoggingBuilder`)
//! - The bootstrapper (`Keel`) with lifecycle events and diagnostics
//!
//! ```rust,ignore
//! use keel_runtime::{ConfigFragment, Keel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fragment = ConfigFragment::new().listener(|emitter| {
//!         emitter.on(LifecycleEvent::ServerStarted, |ctx| async move {
//!             tracing::info!("ready");
//!             Ok(())
//!         });
//!     });
//!
//!     match Keel::new().with_config(fragment).start().await {
//!         Ok(server) => { /* serve until shutdown, then server.stop() */ }
//!         Err(err) => std::process::exit(1),
//!     }
//! }
//! ```
//!
//! # Configuration Sources
//!
//! Lowest to highest precedence: defaults, `default.toml` and
//! `<profile>.toml` in the config directories, `KEEL_*` environment
//! variables, decorators, the caller's fragment.
//!
//! # Timeouts
//!
//! Each plugin registration runs under `keel.register_plugins_timeout`
//! (at least 3000ms). Timeouts are not enforced in the production profile,
//! under a debugger, or when `KEEL_INSPECT` is set.

pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod logging;

// Re-exports
pub use bootstrap::{Keel, StartResult};
pub use config::{
    ComposedConfig, ConfigError, ConfigFragment, ConfigLoader, ConfigResult, KeelConfig,
    KeelSettings, Profile,
};
pub use diagnostics::{Diagnosis, diagnose};
pub use error::{BootError, BootResult, ErrorCode, StartError};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
