//! HTTP server capability implementation.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::MethodRouter};
use futures::future::BoxFuture;
use keel_core::{
    AppState, Plugin, ServerError, ServerFactory, ServerHandle, ServerInfo, ServerOptions,
    ServerResult, invoke_register,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Creates [`HttpServer`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpServerFactory;

impl HttpServerFactory {
    /// Creates a new factory.
    pub fn new() -> Self {
        Self
    }
}

impl ServerFactory for HttpServerFactory {
    fn create(&self, options: ServerOptions) -> ServerResult<Arc<dyn ServerHandle>> {
        if options.address.is_empty() {
            return Err(ServerError::InvalidOptions(
                "connection address must not be empty".into(),
            ));
        }
        Ok(Arc::new(HttpServer::new(options)))
    }
}

/// A running listener.
struct Running {
    info: ServerInfo,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// An axum-backed server.
///
/// Routes are collected while plugins register and frozen on [`start`].
/// Unmatched paths answer with a JSON 404.
///
/// [`start`]: ServerHandle::start
pub struct HttpServer {
    options: ServerOptions,
    app: AppState,
    router: Mutex<Router>,
    plugins: Mutex<Vec<String>>,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    /// Creates a server that has not started yet.
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            app: AppState::new(),
            router: Mutex::new(Router::new()),
            plugins: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Fails once the server is listening.
    pub fn route(&self, path: &str, method_router: MethodRouter) -> ServerResult<()> {
        self.update_router(|router| router.route(path, method_router))?;
        debug!(path = %path, "Route added");
        Ok(())
    }

    /// Merges a router.
    ///
    /// # Errors
    ///
    /// Fails once the server is listening.
    pub fn merge(&self, other: Router) -> ServerResult<()> {
        self.update_router(|router| router.merge(other))
    }

    /// The options the server was created with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    fn update_router(&self, update: impl FnOnce(Router) -> Router) -> ServerResult<()> {
        if self.running.lock().is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let mut router = self.router.lock();
        let current = std::mem::take(&mut *router);
        *router = update(current);
        Ok(())
    }

    fn bind_error(&self, addr: String, source: io::Error) -> ServerError {
        if source.kind() == io::ErrorKind::AddrInUse {
            ServerError::AddressInUse {
                port: self.options.port,
                source,
            }
        } else {
            ServerError::Bind { addr, source }
        }
    }
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("address", &self.options.address)
            .field("port", &self.options.port)
            .field("plugins", &*self.plugins.lock())
            .field("info", &self.info())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServerHandle for HttpServer {
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
        let already_running = self.running.lock().is_some();
        if already_running {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = format!("{}:{}", self.options.address, self.options.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| self.bind_error(addr.clone(), source))?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| self.bind_error(addr.clone(), source))?;
        let info = ServerInfo::new(local_addr, self.options.host.as_deref());

        let router = self.router.lock().clone().fallback(not_found);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "HTTP server error");
            }
        });

        info!(addr = %local_addr, "HTTP server listening");
        *self.running.lock() = Some(Running {
            info: info.clone(),
            shutdown,
            task,
        });
        Ok(info)
    }

    async fn stop(&self) -> ServerResult<()> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        running.shutdown.cancel();
        running
            .task
            .await
            .map_err(|e| ServerError::Task(e.to_string()))?;
        info!(addr = %running.info.address, "HTTP server stopped");
        Ok(())
    }

    fn info(&self) -> Option<ServerInfo> {
        self.running.lock().as_ref().map(|running| running.info.clone())
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

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "statusCode": 404, "error": "Not Found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use keel_core::downcast_server;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn options(port: u16) -> ServerOptions {
        ServerOptions {
            address: "127.0.0.1".into(),
            port,
            ..ServerOptions::default()
        }
    }

    async fn get_raw(info: &ServerInfo, path: &str) -> String {
        let mut stream = TcpStream::connect(info.address).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_plugin_routes_and_not_found() {
        let server = HttpServerFactory::new().create(options(0)).unwrap();
        let hello = Plugin::new("hello").register(|server, _options| async move {
            let http = downcast_server::<HttpServer>(&server).ok_or("not an HTTP server")?;
            http.route("/hello", get(|| async { "hello from keel" }))?;
            Ok(())
        });
        server.clone().register_plugin(hello, Value::Null).await.unwrap();

        let info = server.start().await.unwrap();
        assert_ne!(info.port, 0);
        assert_eq!(server.info(), Some(info.clone()));

        let ok = get_raw(&info, "/hello").await;
        assert!(ok.starts_with("HTTP/1.1 200"));
        assert!(ok.ends_with("hello from keel"));

        let missing = get_raw(&info, "/nope").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
        assert!(missing.contains(r#"{"statusCode":404,"error":"Not Found"}"#));

        server.stop().await.unwrap();
        assert!(server.info().is_none());
        assert!(TcpStream::connect(info.address).await.is_err());
    }

    #[tokio::test]
    async fn test_address_in_use() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let server = HttpServerFactory::new().create(options(port)).unwrap();
        let err = server.start().await.unwrap_err();
        assert!(err.is_address_in_use());
        assert_eq!(
            err.to_string(),
            format!("the network port ({port}) is already in use")
        );
    }

    #[tokio::test]
    async fn test_duplicate_plugin_rejected() {
        let server = HttpServerFactory::new().create(options(0)).unwrap();
        let plugin = Plugin::new("twice").register(|_server, _options| async { Ok(()) });

        server.clone().register_plugin(plugin.clone(), Value::Null).await.unwrap();
        let err = server.clone().register_plugin(plugin, Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "plugin 'twice' is already registered");
    }

    #[tokio::test]
    async fn test_failed_plugin_not_listed() {
        let server = HttpServerFactory::new().create(options(0)).unwrap();
        let failing = Plugin::new("failing").register(|_server, _options| async {
            Err("refused".into())
        });

        assert!(server.clone().register_plugin(failing, Value::Null).await.is_err());
        assert!(server.registered_plugins().is_empty());
        assert!(format!("{server:?}").contains("HttpServer"));
    }

    #[tokio::test]
    async fn test_routes_frozen_after_start() {
        let factory = HttpServerFactory::new();
        let server = factory.create(options(0)).unwrap();
        server.start().await.unwrap();

        let http = downcast_server::<HttpServer>(&server).unwrap();
        let err = http.route("/late", get(|| async { "late" })).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning));
        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));

        server.stop().await.unwrap();
        server.stop().await.unwrap();
    }

    #[test]
    fn test_empty_address_rejected() {
        let err = HttpServerFactory::new()
            .create(ServerOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ServerError::InvalidOptions(_)));
    }
}
