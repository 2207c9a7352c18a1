//! Error types shared by every Keel crate.
//!
//! Higher layers (plugin pipeline, bootstrapper) define their own error enums
//! and wrap [`ServerError`] where the server capability is involved.

use std::io;

use thiserror::Error;

/// Type-erased error returned by plugin registration functions, module
/// loaders and lifecycle listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for server capability operations.
pub type ServerResult<T> = Result<T, ServerError>;

// =============================================================================
// Server Errors
// =============================================================================

/// Errors raised by a server capability implementation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The requested port is held by another process.
    #[error("the network port ({port}) is already in use")]
    AddressInUse {
        /// The port that could not be bound.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Binding the listener failed for any other reason.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The server options could not be turned into a server.
    #[error("invalid server options: {0}")]
    InvalidOptions(String),

    /// A plugin with the same name was registered earlier.
    #[error("plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    /// The plugin object has no registration function.
    #[error("plugin '{0}' has no register function")]
    MissingRegister(String),

    /// The plugin's registration function returned an error.
    #[error(transparent)]
    Registration(BoxError),

    /// `start` was called on a server that is already listening.
    #[error("server is already running")]
    AlreadyRunning,

    /// The serving task ended abnormally.
    #[error("server task failed: {0}")]
    Task(String),
}

impl ServerError {
    /// Whether this error means the listen address was taken.
    pub fn is_address_in_use(&self) -> bool {
        matches!(self, Self::AddressInUse { .. })
    }
}
