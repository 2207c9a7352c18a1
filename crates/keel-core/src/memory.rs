//! An in-process server that registers plugins but never listens.
//!
//! Useful for dry runs and tests of plugin pipelines.

use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::plugin::Plugin;
use crate::server::{
    AppState, ServerFactory, ServerHandle, ServerInfo, ServerOptions, invoke_register,
};

/// A server without a listener.
#[derive(Debug)]
pub struct MemoryServer {
    options: ServerOptions,
    app: AppState,
    plugins: Mutex<Vec<String>>,
    info: Mutex<Option<ServerInfo>>,
    start_error: Mutex<Option<ServerError>>,
    stop_count: Mutex<usize>,
}

impl MemoryServer {
    /// Creates a server from options.
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            app: AppState::new(),
            plugins: Mutex::new(Vec::new()),
            info: Mutex::new(None),
            start_error: Mutex::new(None),
            stop_count: Mutex::new(0),
        }
    }

    /// Makes the next `start` fail with the given error.
    pub fn fail_next_start(&self, err: ServerError) {
        *self.start_error.lock() = Some(err);
    }

    /// How many times `stop` was called.
    pub fn stop_count(&self) -> usize {
        *self.stop_count.lock()
    }

    /// The options the server was created with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

#[async_trait]
impl ServerHandle for MemoryServer {
    fn register_plugin(
        self: Arc<Self>,
        plugin: Plugin,
        options: Value,
    ) -> BoxFuture<'static, ServerResult<()>> {
        Box::pin(async move {
            let name = plugin.name().unwrap_or_default().to_owned();
            if self.plugins.lock().contains(&name) {
                return Err(ServerError::DuplicatePlugin(name));
            }
            invoke_register(Arc::clone(&self) as Arc<dyn ServerHandle>, &plugin, options).await?;
            self.plugins.lock().push(name);
            Ok(())
        })
    }

    async fn start(&self) -> ServerResult<ServerInfo> {
        let injected = self.start_error.lock().take();
        if let Some(err) = injected {
            return Err(err);
        }
        let mut info = self.info.lock();
        if info.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let ip = self
            .options
            .address
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let started = ServerInfo::new(
            SocketAddr::new(ip, self.options.port),
            self.options.host.as_deref(),
        );
        debug!(uri = %started.uri, "Memory server started");
        *info = Some(started.clone());
        Ok(started)
    }

    async fn stop(&self) -> ServerResult<()> {
        *self.stop_count.lock() += 1;
        self.info.lock().take();
        Ok(())
    }

    fn info(&self) -> Option<ServerInfo> {
        self.info.lock().clone()
    }

    fn app(&self) -> &AppState {
        &self.app
    }

    fn config(&self) -> &Value {
        &self.options.app_config
    }

    fn registered_plugins(&self) -> Vec<String> {
        self.plugins.lock().clone()
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Creates [`MemoryServer`]s and keeps track of them.
#[derive(Debug, Default)]
pub struct MemoryServerFactory {
    created: Mutex<Vec<Arc<MemoryServer>>>,
}

impl MemoryServerFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently created server.
    pub fn last(&self) -> Option<Arc<MemoryServer>> {
        self.created.lock().last().cloned()
    }

    /// Number of servers created so far.
    pub fn created(&self) -> usize {
        self.created.lock().len()
    }
}

impl ServerFactory for MemoryServerFactory {
    fn create(&self, options: ServerOptions) -> ServerResult<Arc<dyn ServerHandle>> {
        let server = Arc::new(MemoryServer::new(options));
        self.created.lock().push(server.clone());
        Ok(server)
    }
}
