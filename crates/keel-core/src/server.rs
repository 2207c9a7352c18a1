//! The server capability.
//!
//! The bootstrapper never builds a server itself. It asks a [`ServerFactory`]
//! for a [`ServerHandle`], registers plugins through it and starts it. The
//! HTTP implementation lives in `keel-transport`; tests use in-memory fakes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ServerError, ServerResult};
use crate::plugin::Plugin;

// =============================================================================
// Options & Info
// =============================================================================

/// Options handed to [`ServerFactory::create`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Host name used when building the public URI.
    pub host: Option<String>,
    /// Address to bind.
    pub address: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Implementation-specific settings (the `server` config section).
    pub settings: Value,
    /// The fully merged configuration, visible to plugins.
    pub app_config: Arc<Value>,
}

/// Where a started server is listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Bound socket address.
    pub address: SocketAddr,
    /// Bound port.
    pub port: u16,
    /// Public URI, e.g. `http://localhost:3000`.
    pub uri: String,
}

impl ServerInfo {
    /// Builds info for a bound address. The URI uses `host` when given, and
    /// `localhost` for unspecified addresses.
    pub fn new(address: SocketAddr, host: Option<&str>) -> Self {
        let host = match host {
            Some(host) => host.to_owned(),
            None if address.ip().is_unspecified() => "localhost".to_owned(),
            None => address.ip().to_string(),
        };
        Self {
            address,
            port: address.port(),
            uri: format!("http://{host}:{}", address.port()),
        }
    }
}

// =============================================================================
// App State
// =============================================================================

/// Shared state plugins use to coordinate with each other.
///
/// Earlier plugins set flags or values here; later plugins read them.
#[derive(Debug, Default)]
pub struct AppState {
    values: RwLock<Map<String, Value>>,
    exposed: RwLock<HashMap<String, Map<String, Value>>>,
}

impl AppState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.write().insert(key.into(), value)
    }

    /// Gets a copy of a value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Whether a key holds a truthy value (`true`, non-zero, non-empty).
    pub fn is_set(&self, key: &str) -> bool {
        match self.values.read().get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Publishes a value under a plugin's namespace.
    pub fn expose(&self, plugin: &str, key: impl Into<String>, value: Value) {
        self.exposed
            .write()
            .entry(plugin.to_owned())
            .or_default()
            .insert(key.into(), value);
    }

    /// Everything a plugin has exposed.
    pub fn exposed(&self, plugin: &str) -> Option<Map<String, Value>> {
        self.exposed.read().get(plugin).cloned()
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// A server instance.
#[async_trait]
pub trait ServerHandle: fmt::Debug + Send + Sync + 'static {
    /// Registers a plugin, running its registration function to completion.
    ///
    /// Implementations reject duplicate plugin names, delegate to
    /// [`invoke_register`] to run the plugin, and record the name only once
    /// the registration succeeded.
    fn register_plugin(
        self: Arc<Self>,
        plugin: Plugin,
        options: Value,
    ) -> BoxFuture<'static, ServerResult<()>>;

    /// Starts listening.
    async fn start(&self) -> ServerResult<ServerInfo>;

    /// Stops listening. Stopping a server that never started is a no-op.
    async fn stop(&self) -> ServerResult<()>;

    /// Where the server is listening, once started.
    fn info(&self) -> Option<ServerInfo>;

    /// Shared plugin state.
    fn app(&self) -> &AppState;

    /// The merged configuration the server was created with.
    fn config(&self) -> &Value;

    /// Names of the plugins registered successfully so far, in order.
    fn registered_plugins(&self) -> Vec<String>;

    /// Upcasts for downcasting to the concrete server type.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Creates server instances.
pub trait ServerFactory: Send + Sync {
    /// Creates a server from options.
    fn create(&self, options: ServerOptions) -> ServerResult<Arc<dyn ServerHandle>>;
}

/// Runs a plugin's registration function against a server.
pub async fn invoke_register(
    server: Arc<dyn ServerHandle>,
    plugin: &Plugin,
    options: Value,
) -> ServerResult<()> {
    let name = plugin.name().unwrap_or("<anonymous>");
    let register = plugin
        .register_fn()
        .ok_or_else(|| ServerError::MissingRegister(name.to_owned()))?;

    register(server, options)
        .await
        .map_err(ServerError::Registration)
}

/// Downcasts a server handle to its concrete type.
pub fn downcast_server<T: ServerHandle>(server: &Arc<dyn ServerHandle>) -> Option<Arc<T>> {
    server.clone().as_any().downcast::<T>().ok()
}
