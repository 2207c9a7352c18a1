//! Error types for the Keel plugin pipeline and lifecycle events.

use std::time::Duration;

use keel_core::{BoxError, ServerError};
use thiserror::Error;

use crate::lifecycle::LifecycleEvent;
use crate::plugin::LoadTrace;

// =============================================================================
// Plugin Errors
// =============================================================================

/// Errors raised while ordering, resolving or registering plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A `require_from_path` value is not a string.
    #[error("{location} 'require_from_path' must be a string")]
    InvalidBasePath {
        /// `plugins` for the global value, otherwise `plugin '<name>'`.
        location: String,
    },

    /// `module: false` without a direct plugin object.
    #[error("plugin '{plugin}' disabled 'module' but has no 'register' field")]
    ModuleDisabled {
        /// Plugin name.
        plugin: String,
    },

    /// An object `module` without a `name`.
    #[error("plugin '{plugin}' has a 'module' object without a 'name'")]
    ModuleNameMissing {
        /// Plugin name.
        plugin: String,
    },

    /// The module could not be loaded.
    #[error("Failed loading module {module}{}: {source}", from_path(.path))]
    ModuleLoad {
        /// Plugin whose module failed to load.
        plugin: String,
        /// Module identity.
        module: String,
        /// Base path the module was loaded from, if any.
        path: Option<String>,
        /// Loader error.
        #[source]
        source: BoxError,
    },

    /// The loaded value is not a usable plugin object.
    #[error("plugin '{plugin}' {trace} is invalid: {reason}")]
    Invalid {
        /// Plugin name.
        plugin: String,
        /// How the plugin was obtained.
        trace: LoadTrace,
        /// The failed check.
        reason: &'static str,
    },

    /// The server rejected the plugin or its registration function failed.
    #[error("Failed to register plugin '{plugin}' {trace}: {source}")]
    Registration {
        /// Plugin name.
        plugin: String,
        /// How the plugin was obtained.
        trace: LoadTrace,
        /// Server-side error.
        #[source]
        source: ServerError,
    },

    /// The registration did not finish in time.
    #[error(
        "Timed out registering plugin '{plugin}' {trace} after {}ms - did it forget to complete its registration?",
        .timeout.as_millis()
    )]
    Timeout {
        /// Plugin name.
        plugin: String,
        /// How the plugin was obtained.
        trace: LoadTrace,
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

impl PluginError {
    /// Name of the plugin involved, when there is one.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::ModuleDisabled { plugin }
            | Self::ModuleNameMissing { plugin }
            | Self::Invalid { plugin, .. }
            | Self::Registration { plugin, .. }
            | Self::ModuleLoad { plugin, .. }
            | Self::Timeout { plugin, .. } => Some(plugin),
            Self::InvalidBasePath { .. } => None,
        }
    }

    /// How the plugin was obtained, when known.
    pub fn trace(&self) -> Option<&LoadTrace> {
        match self {
            Self::Invalid { trace, .. }
            | Self::Registration { trace, .. }
            | Self::Timeout { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

/// A module identity no loader knows about.
#[derive(Debug, Clone, Error)]
#[error("cannot find module '{0}'")]
pub struct ModuleNotFound(pub String);

fn from_path(path: &Option<String>) -> String {
    path.as_ref()
        .map(|path| format!(" from path: {path}"))
        .unwrap_or_default()
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

// =============================================================================
// Lifecycle Errors
// =============================================================================

/// Errors raised while emitting lifecycle events.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A listener returned an error.
    #[error("lifecycle event '{event}' failed: {source}")]
    Failed {
        /// The event being emitted.
        event: LifecycleEvent,
        /// Listener error.
        #[source]
        source: BoxError,
    },

    /// Listeners did not finish within the event timeout.
    #[error("lifecycle event '{event}' timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// The event being emitted.
        event: LifecycleEvent,
        /// The configured event timeout.
        timeout: Duration,
    },
}

impl LifecycleError {
    /// The event being emitted.
    pub fn event(&self) -> LifecycleEvent {
        match self {
            Self::Failed { event, .. } | Self::Timeout { event, .. } => *event,
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_load_message() {
        let err = PluginError::ModuleLoad {
            plugin: "local".into(),
            module: "./missing".into(),
            path: None,
            source: "not found".into(),
        };
        assert_eq!(err.to_string(), "Failed loading module ./missing: not found");

        let err = PluginError::ModuleLoad {
            plugin: "login".into(),
            module: "auth".into(),
            path: Some("/srv/plugins".into()),
            source: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed loading module auth from path: /srv/plugins: boom"
        );
        assert_eq!(err.plugin(), Some("login"));
        assert!(err.trace().is_none());
    }

    #[test]
    fn test_timeout_message_names_plugin() {
        let err = PluginError::Timeout {
            plugin: "slow".into(),
            trace: LoadTrace::direct(),
            timeout: Duration::from_millis(3000),
        };
        assert_eq!(
            err.to_string(),
            "Timed out registering plugin 'slow' with register function after 3000ms - \
             did it forget to complete its registration?"
        );
        assert_eq!(err.plugin(), Some("slow"));
    }

    #[test]
    fn test_lifecycle_messages() {
        let err = LifecycleError::Timeout {
            event: LifecycleEvent::PluginsRegistered,
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "lifecycle event 'plugins-registered' timed out after 250ms"
        );
        assert_eq!(err.event(), LifecycleEvent::PluginsRegistered);
    }
}
