//! Sequential plugin registration under a timeout.
//!
//! Plugins are registered strictly one after another, in order. Each
//! registration runs as its own task and is awaited under the registration
//! timeout; a registration that outlives the timeout is abandoned, not
//! cancelled. While a batch runs, a single advisory notice is logged if it is
//! still busy after [`PluginRegistrar::notice_delay`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use keel_core::{ServerError, ServerHandle};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::plugin::resolver::ResolvedPlugin;

/// Default per-plugin registration timeout.
pub const DEFAULT_REGISTER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Whether registration timeouts are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Fail registrations that exceed the timeout.
    pub enforce: bool,
}

impl TimeoutPolicy {
    /// Timeouts fail the registration.
    pub const fn enforced() -> Self {
        Self { enforce: true }
    }

    /// Timeouts are ignored; registrations may take as long as they need.
    pub const fn relaxed() -> Self {
        Self { enforce: false }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::enforced()
    }
}

/// Registers resolved plugins with a server.
#[derive(Debug, Clone)]
pub struct PluginRegistrar {
    timeout: Duration,
    policy: TimeoutPolicy,
}

impl PluginRegistrar {
    /// Creates a registrar with the given per-plugin timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            policy: TimeoutPolicy::default(),
        }
    }

    /// Sets the timeout policy.
    pub fn with_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The per-plugin timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The timeout policy.
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    /// Delay before the "taking a while" notice: a fifth of the timeout for
    /// timeouts of 10s or more, otherwise half of it, capped at 3s.
    pub fn notice_delay(&self) -> Duration {
        if self.timeout >= Duration::from_secs(10) {
            self.timeout / 5
        } else {
            (self.timeout / 2).min(Duration::from_secs(3))
        }
    }

    /// Registers every plugin in order. Stops at the first failure.
    pub async fn register_all(
        &self,
        server: &Arc<dyn ServerHandle>,
        plugins: &[ResolvedPlugin],
    ) -> PluginResult<()> {
        let in_flight = Arc::new(Mutex::new(None::<String>));
        let _notice = NoticeGuard::spawn(self.notice_delay(), Arc::clone(&in_flight));

        let started = Instant::now();
        for plugin in plugins {
            *in_flight.lock() = Some(plugin.name.clone());
            self.register(server, plugin).await?;
        }
        in_flight.lock().take();

        info!(
            count = plugins.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plugins registered"
        );
        Ok(())
    }

    /// Registers a single plugin.
    pub async fn register(
        &self,
        server: &Arc<dyn ServerHandle>,
        plugin: &ResolvedPlugin,
    ) -> PluginResult<()> {
        debug!(plugin = %plugin.name, trace = %plugin.trace, "Registering plugin");
        let started = Instant::now();

        let task = tokio::spawn(
            Arc::clone(server).register_plugin(plugin.plugin.clone(), plugin.options.clone()),
        );

        let joined = if self.policy.enforce {
            match tokio::time::timeout(self.timeout, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        plugin = %plugin.name,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Plugin registration timed out"
                    );
                    return Err(PluginError::Timeout {
                        plugin: plugin.name.clone(),
                        trace: plugin.trace.clone(),
                        timeout: self.timeout,
                    });
                }
            }
        } else {
            task.await
        };

        joined
            .unwrap_or_else(|err| Err(ServerError::Task(err.to_string())))
            .map_err(|source| PluginError::Registration {
                plugin: plugin.name.clone(),
                trace: plugin.trace.clone(),
                source,
            })?;

        debug!(
            plugin = %plugin.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Plugin registered"
        );
        Ok(())
    }
}

impl Default for PluginRegistrar {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTER_TIMEOUT)
    }
}

/// Logs the "taking a while" notice once; aborts the timer task on drop.
struct NoticeGuard(JoinHandle<()>);

impl NoticeGuard {
    fn spawn(delay: Duration, in_flight: Arc<Mutex<Option<String>>>) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = in_flight.lock().clone();
            if let Some(plugin) = current {
                warn!(
                    plugin = %plugin,
                    waited_ms = delay.as_millis() as u64,
                    "Plugin registration is taking a while"
                );
            }
        }))
    }
}

impl Drop for NoticeGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
