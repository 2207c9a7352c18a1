//! Runtime error types.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;

use keel_core::ServerError;
use keel_framework::{LifecycleError, LoadTrace, PluginError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::diagnostics::Diagnosis;

/// Stable classification of start failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidPlugin,
    ModuleLoadFailed,
    PluginFailed,
    PluginTimeout,
    EventFailed,
    EventTimeout,
    AddressInUse,
    ServerStartFailed,
    ServerCreateFailed,
    ConfigInvalid,
}

impl ErrorCode {
    /// The code as it appears in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPlugin => "INVALID_PLUGIN",
            Self::ModuleLoadFailed => "MODULE_LOAD_FAILED",
            Self::PluginFailed => "PLUGIN_FAILED",
            Self::PluginTimeout => "PLUGIN_TIMEOUT",
            Self::EventFailed => "EVENT_FAILED",
            Self::EventTimeout => "EVENT_TIMEOUT",
            Self::AddressInUse => "ADDRESS_IN_USE",
            Self::ServerStartFailed => "SERVER_START_FAILED",
            Self::ServerCreateFailed => "SERVER_CREATE_FAILED",
            Self::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while bootstrapping a server.
#[derive(Error, Debug)]
pub enum BootError {
    /// Configuration could not be composed or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin could not be ordered, resolved or registered.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A lifecycle listener failed or timed out.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The server factory rejected the options.
    #[error("Failed to create server: {0}")]
    ServerCreate(#[source] ServerError),

    /// The server could not start listening.
    #[error("Failed to start server: {0}")]
    ServerStart(#[source] ServerError),
}

impl BootError {
    /// The classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Plugin(err) => match err {
                PluginError::InvalidBasePath { .. } => ErrorCode::ConfigInvalid,
                PluginError::ModuleDisabled { .. }
                | PluginError::ModuleNameMissing { .. }
                | PluginError::Invalid { .. } => ErrorCode::InvalidPlugin,
                PluginError::ModuleLoad { .. } => ErrorCode::ModuleLoadFailed,
                PluginError::Registration { .. } => ErrorCode::PluginFailed,
                PluginError::Timeout { .. } => ErrorCode::PluginTimeout,
            },
            Self::Lifecycle(LifecycleError::Failed { .. }) => ErrorCode::EventFailed,
            Self::Lifecycle(LifecycleError::Timeout { .. }) => ErrorCode::EventTimeout,
            Self::ServerCreate(_) => ErrorCode::ServerCreateFailed,
            Self::ServerStart(err) if err.is_address_in_use() => ErrorCode::AddressInUse,
            Self::ServerStart(_) => ErrorCode::ServerStartFailed,
        }
    }
}

/// Result type for bootstrap phases.
pub type BootResult<T> = Result<T, BootError>;

/// A failed start, as handed back to the caller.
///
/// Carries the classified error, its diagnosis, the call site of
/// [`Keel::start`](crate::Keel::start) and a backtrace captured when the
/// failure was reported.
pub struct StartError {
    error: BootError,
    diagnosis: Diagnosis,
    call_site: &'static Location<'static>,
    backtrace: Backtrace,
}

impl StartError {
    pub(crate) fn new(
        error: BootError,
        diagnosis: Diagnosis,
        call_site: &'static Location<'static>,
    ) -> Self {
        Self {
            error,
            diagnosis,
            call_site,
            backtrace: Backtrace::capture(),
        }
    }

    /// The classification.
    pub fn code(&self) -> ErrorCode {
        self.diagnosis.code
    }

    /// The underlying error.
    pub fn error(&self) -> &BootError {
        &self.error
    }

    /// Consumes this error, returning the underlying one.
    pub fn into_error(self) -> BootError {
        self.error
    }

    /// Reason and suggested resolution.
    pub fn diagnosis(&self) -> &Diagnosis {
        &self.diagnosis
    }

    /// Name of the plugin involved, when there is one.
    pub fn plugin(&self) -> Option<&str> {
        match &self.error {
            BootError::Plugin(err) => err.plugin(),
            _ => None,
        }
    }

    /// How the plugin involved was obtained, when known.
    pub fn load_trace(&self) -> Option<&LoadTrace> {
        match &self.error {
            BootError::Plugin(err) => err.trace(),
            _ => None,
        }
    }

    /// Where `start` was called.
    pub fn call_site(&self) -> &'static Location<'static> {
        self.call_site
    }

    /// Backtrace captured when the failure was reported. Only populated when
    /// `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` enables capture.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.diagnosis.reason, self.error)
    }
}

impl fmt::Debug for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartError")
            .field("code", &self.code())
            .field("error", &self.error)
            .field("call_site", &self.call_site)
            .finish_non_exhaustive()
    }
}

impl StdError for StartError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}
