use std::fmt;
use std::sync::{Arc, OnceLock};

use keel_core::ServerHandle;
use serde_json::Value;

use crate::error::LifecycleResult;
use crate::lifecycle::emitter::LifecycleEmitter;
use crate::lifecycle::event::LifecycleEvent;
use crate::plugin::{OrderedPlugin, ResolvedPlugin};

/// State of one bootstrap invocation, handed to every listener.
///
/// The configuration is immutable. The server, the ordered plugin list and the
/// resolved plugins are set once, as the bootstrap reaches the phases that
/// produce them. Plugins are only published after every module loaded.
pub struct LifecycleContext {
    config: Arc<Value>,
    emitter: Arc<LifecycleEmitter>,
    server: OnceLock<Arc<dyn ServerHandle>>,
    plugins: OnceLock<Vec<OrderedPlugin>>,
    resolved: OnceLock<Vec<ResolvedPlugin>>,
}

impl LifecycleContext {
    /// Creates a context for a merged configuration.
    pub fn new(config: Arc<Value>, emitter: Arc<LifecycleEmitter>) -> Self {
        Self {
            config,
            emitter,
            server: OnceLock::new(),
            plugins: OnceLock::new(),
            resolved: OnceLock::new(),
        }
    }

    /// The merged configuration.
    pub fn config(&self) -> &Arc<Value> {
        &self.config
    }

    /// The emitter of this invocation.
    pub fn emitter(&self) -> &Arc<LifecycleEmitter> {
        &self.emitter
    }

    /// The server, once created.
    pub fn server(&self) -> Option<&Arc<dyn ServerHandle>> {
        self.server.get()
    }

    /// Stores the server. Fails, returning the handle, if one is already set.
    pub fn set_server(&self, server: Arc<dyn ServerHandle>) -> Result<(), Arc<dyn ServerHandle>> {
        self.server.set(server)
    }

    /// The ordered plugins, once sorted.
    pub fn plugins(&self) -> Option<&[OrderedPlugin]> {
        self.plugins.get().map(Vec::as_slice)
    }

    /// Stores the ordered plugins. Fails, returning them, if already set.
    pub fn set_plugins(&self, plugins: Vec<OrderedPlugin>) -> Result<(), Vec<OrderedPlugin>> {
        self.plugins.set(plugins)
    }

    /// The resolved plugin objects, in registration order.
    pub fn resolved(&self) -> Option<&[ResolvedPlugin]> {
        self.resolved.get().map(Vec::as_slice)
    }

    /// Stores the resolved plugins. Fails, returning them, if already set.
    pub fn set_resolved(&self, resolved: Vec<ResolvedPlugin>) -> Result<(), Vec<ResolvedPlugin>> {
        self.resolved.set(resolved)
    }

    /// Emits an event through this context's emitter.
    pub async fn emit(self: &Arc<Self>, event: LifecycleEvent) -> LifecycleResult<()> {
        self.emitter.emit(event, self).await
    }
}

impl fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("emitter", &self.emitter)
            .field("server", &self.server.get().and_then(|server| server.info()))
            .field("plugins", &self.plugins.get().map(Vec::len))
            .field("resolved", &self.resolved.get().map(Vec::len))
            .finish_non_exhaustive()
    }
}
