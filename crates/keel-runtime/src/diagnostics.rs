//! User-facing diagnosis of start failures.
//!
//! Every failure is classified into an [`ErrorCode`], given a reason and a
//! suggested resolution, and logged once as a single report.

use keel_core::ServerError;
use keel_framework::{LifecycleError, PluginError};
use tracing::error;

use crate::error::{BootError, ErrorCode};

/// Reason and suggested resolution for a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub code: ErrorCode,
    pub reason: String,
    pub resolution: String,
}

/// Classifies a failure and explains it.
pub fn diagnose(err: &BootError) -> Diagnosis {
    let code = err.code();
    let (reason, resolution) = match err {
        BootError::Config(_) => (
            "the server configuration could not be composed".to_string(),
            "Check the configuration files, KEEL_* environment variables and \
             programmatic overrides named in the message below."
                .to_string(),
        ),
        BootError::Plugin(err) => diagnose_plugin(code, err),
        BootError::Lifecycle(LifecycleError::Timeout { event, timeout }) => (
            format!(
                "your listener for event '{event}' did not finish within {}ms",
                timeout.as_millis()
            ),
            "The event timeout is set with 'keel.event_timeout' (in milliseconds) and is \
             disabled when zero. If the listener needs more time, raise the timeout; \
             otherwise make sure the listener completes."
                .to_string(),
        ),
        BootError::Lifecycle(LifecycleError::Failed { event, .. }) => (
            format!("your listener for event '{event}' returned an error"),
            format!("Check the listener registered for '{event}'."),
        ),
        BootError::ServerStart(ServerError::AddressInUse { port, .. }) => (
            format!(
                "the network port ({port}) is already in use but your server is trying to \
                 listen to it"
            ),
            format!(
                "Ensure no other process is listening on port {port}, or change \
                 'connection.port'. To find the process run: lsof -i :{port}"
            ),
        ),
        BootError::ServerStart(_) | BootError::ServerCreate(_) => (
            "there was an error starting the server".to_string(),
            "This is most likely caused by a misbehaving plugin or invalid 'connection' \
             and 'server' settings. Check the error below."
                .to_string(),
        ),
    };

    Diagnosis {
        code,
        reason,
        resolution,
    }
}

fn diagnose_plugin(code: ErrorCode, err: &PluginError) -> (String, String) {
    let name = err.plugin().unwrap_or("unknown");
    match code {
        ErrorCode::PluginTimeout => (
            format!("registering your plugin '{name}' did not complete in time"),
            format!(
                "Make sure plugin '{name}' finishes its registration. Slow plugins can \
                 raise 'keel.register_plugins_timeout' (in milliseconds, at least 3000)."
            ),
        ),
        ErrorCode::PluginFailed => (
            format!("failed registering your plugin '{name}'"),
            format!("Check plugin '{name}' and the plugins it depends on being registered first."),
        ),
        ErrorCode::ModuleLoadFailed => (
            format!("failed loading the module for your plugin '{name}'"),
            format!(
                "Check that the module of plugin '{name}' is registered with \
                 #[register_module] or in the module catalog, and that 'require_from_path' \
                 points at the right location."
            ),
        ),
        ErrorCode::ConfigInvalid => (
            "the plugins configuration is invalid".to_string(),
            "'require_from_path' must be a string, both on the plugins mapping and on entries."
                .to_string(),
        ),
        _ => (
            format!("plugin '{name}' is not a valid plugin"),
            format!(
                "A plugin needs a name and a register function. Check the 'module' and \
                 'register' settings of plugin '{name}'."
            ),
        ),
    }
}

/// Logs a diagnosis together with the error it explains.
pub fn report(diagnosis: &Diagnosis, err: &BootError) {
    error!(
        code = %diagnosis.code,
        reason = %diagnosis.reason,
        error = %err,
        resolution = %diagnosis.resolution,
        "Keel caught an error while starting your server"
    );
}
