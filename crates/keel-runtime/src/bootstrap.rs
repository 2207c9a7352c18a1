//! The bootstrap sequence.
//!
//! ```text
//! init ─► config-composed ─► server-created ─► plugins-sorted
//!      ─► plugins-registered ─► server-started ─► complete
//! ```
//!
//! Each arrow is a lifecycle event whose listeners must finish before the
//! next phase begins. Any failure ends the sequence; a server that already
//! started is stopped on a best-effort basis, and the failure is diagnosed,
//! logged and returned.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keel_runtime::{ConfigFragment, Keel};
//!
//! let server = Keel::new()
//!     .with_config(ConfigFragment::new().port(8080).register("hello", hello_plugin()))
//!     .start()
//!     .await?;
//! ```

use std::future::Future;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use keel_core::{ServerFactory, ServerHandle, ServerOptions};
use keel_framework::{
    LifecycleContext, LifecycleEmitter, LifecycleEvent, ModuleCatalog, ModuleLoader,
    PluginRegistrar, PluginResolver, TimeoutPolicy, order_plugins,
};
use keel_transport::HttpServerFactory;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{ComposedConfig, ConfigFragment, ConfigLoader};
use crate::diagnostics::{diagnose, report};
use crate::environment;
use crate::error::{BootError, BootResult, StartError};
use crate::logging;

/// Result of a start.
pub type StartResult = Result<Arc<dyn ServerHandle>, StartError>;

/// Bootstraps a server.
///
/// Each `Keel` value performs one start; its emitter and context are never
/// shared with another invocation.
pub struct Keel {
    loader: ConfigLoader,
    decorators: Vec<ConfigFragment>,
    fragment: ConfigFragment,
    factory: Arc<dyn ServerFactory>,
    modules: Arc<dyn ModuleLoader>,
    cwd: Option<PathBuf>,
    timeout_policy: Option<TimeoutPolicy>,
    init_logging: bool,
}

impl Default for Keel {
    fn default() -> Self {
        Self::new()
    }
}

impl Keel {
    /// Creates a bootstrapper serving HTTP, loading modules from the link-time
    /// registry and configuration from the default locations.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            decorators: Vec::new(),
            fragment: ConfigFragment::new(),
            factory: Arc::new(HttpServerFactory::new()),
            modules: Arc::new(ModuleCatalog::new()),
            cwd: None,
            timeout_policy: None,
            init_logging: true,
        }
    }

    /// Sets the caller's configuration, the highest-precedence layer.
    pub fn with_config(mut self, fragment: ConfigFragment) -> Self {
        self.fragment = fragment;
        self
    }

    /// Adds a decorator layer. Decorators apply in the order they are added,
    /// below the caller's configuration.
    pub fn decorate(mut self, decorator: ConfigFragment) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.search_path(path.into());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.file(path.into());
        self
    }

    /// Disables configuration from environment variables.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Replaces the server factory.
    pub fn server_factory(mut self, factory: Arc<dyn ServerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Replaces the module loader.
    pub fn modules(mut self, modules: Arc<dyn ModuleLoader>) -> Self {
        self.modules = modules;
        self
    }

    /// Sets the directory relative module paths resolve against.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Overrides the timeout policy derived from the environment.
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = Some(policy);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Runs the bootstrap sequence.
    ///
    /// On failure the returned [`StartError`] records the location of this
    /// call.
    #[track_caller]
    pub fn start(self) -> impl Future<Output = StartResult> + Send + 'static {
        let call_site = Location::caller();
        async move { self.run(call_site).await }
    }

    /// Runs the bootstrap sequence on a new task and hands the outcome to
    /// `callback`.
    #[track_caller]
    pub fn start_with<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(StartResult) + Send + 'static,
    {
        let call_site = Location::caller();
        tokio::spawn(async move { callback(self.run(call_site).await) })
    }

    async fn run(self, call_site: &'static Location<'static>) -> StartResult {
        let mut started = None;
        match self.boot(&mut started).await {
            Ok(server) => Ok(server),
            Err(err) => {
                if let Some(server) = started {
                    if let Err(stop_err) = server.stop().await {
                        warn!(error = %stop_err, "Failed to stop server after start failure");
                    }
                }
                let diagnosis = diagnose(&err);
                report(&diagnosis, &err);
                Err(StartError::new(err, diagnosis, call_site))
            }
        }
    }

    #[instrument(name = "keel_start", skip_all)]
    async fn boot(
        self,
        started: &mut Option<Arc<dyn ServerHandle>>,
    ) -> BootResult<Arc<dyn ServerHandle>> {
        let ComposedConfig {
            profile,
            value,
            mut config,
        } = self.compose()?;

        if self.init_logging {
            logging::init_from_config(&config.logging, config.keel.log_level());
        }
        environment::check_profile(&profile);

        let emitter = LifecycleEmitter::new().with_event_timeout(config.keel.event_timeout());
        for fragment in self.decorators.iter().chain([&self.fragment]) {
            if let Some(setup) = fragment.listener_setup() {
                emitter.attach(setup);
            }
        }
        for fragment in self.decorators.iter().chain([&self.fragment]) {
            for (key, plugin) in fragment.registers() {
                config.plugins.attach_register(key, plugin.clone());
            }
        }

        let ctx = Arc::new(LifecycleContext::new(Arc::clone(&value), Arc::new(emitter)));
        ctx.emit(LifecycleEvent::ConfigComposed).await?;

        let options = ServerOptions {
            host: config.connection.host.clone(),
            address: config.connection.address.clone(),
            port: config.connection.port,
            settings: config.server.clone(),
            app_config: Arc::clone(&value),
        };
        let server = self
            .factory
            .create(options)
            .map_err(BootError::ServerCreate)?;
        let _ = ctx.set_server(Arc::clone(&server));
        ctx.emit(LifecycleEvent::ServerCreated).await?;

        let ordered = order_plugins(&config.plugins)?;
        debug!(
            order = ?ordered.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            "Plugins sorted"
        );

        let mut resolver = PluginResolver::new(Arc::clone(&self.modules));
        if let Some(cwd) = &self.cwd {
            resolver = resolver.with_cwd(cwd);
        }
        let resolved = resolver.resolve_all(&ordered).await?;
        let _ = ctx.set_plugins(ordered);
        let _ = ctx.set_resolved(resolved.clone());
        ctx.emit(LifecycleEvent::PluginsSorted).await?;

        let policy = self
            .timeout_policy
            .unwrap_or_else(|| environment::timeout_policy(&profile));
        PluginRegistrar::new(config.keel.register_timeout())
            .with_policy(policy)
            .register_all(&server, &resolved)
            .await?;
        ctx.emit(LifecycleEvent::PluginsRegistered).await?;

        let info = server.start().await.map_err(BootError::ServerStart)?;
        *started = Some(Arc::clone(&server));
        ctx.emit(LifecycleEvent::ServerStarted).await?;

        if !config.keel.suppress_startup_banner {
            info!(uri = %info.uri, "server running at {}", info.uri);
        }

        ctx.emit(LifecycleEvent::Complete).await?;
        Ok(server)
    }

    fn compose(&self) -> BootResult<ComposedConfig> {
        let mut loader = self.loader.clone();
        for fragment in self.decorators.iter().chain([&self.fragment]) {
            loader = loader.merge(fragment.values().clone());
        }
        Ok(loader.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use keel_core::{
        MemoryServer, MemoryServerFactory, Module, Plugin, ServerError, downcast_server,
    };
    use keel_framework::{LoadTrace, ModuleSpec, PluginConfigEntry};
    use keel_transport::HttpServer;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::time::Instant;

    use crate::error::ErrorCode;

    fn keel(factory: &Arc<MemoryServerFactory>) -> Keel {
        Keel::new()
            .search_path("/nonexistent/keel-bootstrap-test")
            .without_env()
            .without_logging()
            .profile("test")
            .server_factory(factory.clone())
            .modules(Arc::new(ModuleCatalog::empty()))
    }

    fn recorder(seen: &Arc<Mutex<Vec<LifecycleEvent>>>) -> ConfigFragment {
        let seen = Arc::clone(seen);
        ConfigFragment::new().listener(move |emitter| {
            for event in LifecycleEvent::ALL {
                let seen = Arc::clone(&seen);
                emitter.on(event, move |_ctx| {
                    let seen = Arc::clone(&seen);
                    async move {
                        seen.lock().push(event);
                        Ok(())
                    }
                });
            }
        })
    }

    /// Sets `flag` when registered; fails unless every `needs` flag is set.
    fn flag_plugin(name: &str, needs: &'static [&'static str]) -> Plugin {
        let flag = name.to_string();
        Plugin::new(name).register(move |server, _options| {
            let flag = flag.clone();
            async move {
                for dep in needs {
                    if !server.app().is_set(dep) {
                        return Err(format!("{flag} needs {dep}").into());
                    }
                }
                server.app().set(flag, Value::Bool(true));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_empty_config_emits_every_event_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let server = Keel::new()
            .search_path("/nonexistent/keel-bootstrap-test")
            .without_env()
            .without_logging()
            .modules(Arc::new(ModuleCatalog::empty()))
            .with_config(
                recorder(&seen).merge(json!({ "connection": { "address": "127.0.0.1", "port": 0 } })),
            )
            .start()
            .await
            .unwrap();

        let info = server.info().unwrap();
        assert_ne!(info.port, 0);
        assert!(downcast_server::<HttpServer>(&server).is_some());
        assert_eq!(seen.lock().as_slice(), LifecycleEvent::ALL.as_slice());

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_plugins_register_in_priority_order() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::new()
            .plugin("a", PluginConfigEntry::new().priority(50).register(flag_plugin("a", &["b", "d"])))
            .plugin("b", PluginConfigEntry::new().priority("10").register(flag_plugin("b", &[])))
            .plugin("c", PluginConfigEntry::new().register(flag_plugin("c", &["a"])))
            .plugin("d", PluginConfigEntry::new().priority(10).register(flag_plugin("d", &["b"])));

        let server = keel(&factory).with_config(fragment).start().await.unwrap();
        assert_eq!(server.registered_plugins(), vec!["b", "d", "a", "c"]);
        assert!(server.app().is_set("c"));
    }

    #[tokio::test]
    async fn test_dependency_out_of_order_fails() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::new()
            .plugin("late", PluginConfigEntry::new().priority(1).register(flag_plugin("late", &["early"])))
            .plugin("early", PluginConfigEntry::new().priority(2).register(flag_plugin("early", &[])));

        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PluginFailed);
        assert_eq!(err.plugin(), Some("late"));
        assert_eq!(err.load_trace(), Some(&LoadTrace::Direct));
        assert!(err.to_string().contains("late needs early"));
    }

    #[tokio::test]
    async fn test_disabled_module_without_register_fails_before_registration() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::new()
            .register("first", flag_plugin("first", &[]))
            .plugin("legacy", PluginConfigEntry::new().module(ModuleSpec::Enabled(false)));

        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPlugin);
        assert!(err
            .to_string()
            .contains("plugin 'legacy' disabled 'module' but has no 'register' field"));
        assert!(factory.last().unwrap().registered_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_entries_are_never_loaded() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::new()
            .plugin("ghost", PluginConfigEntry::new().enable(false).module(ModuleSpec::name("missing")))
            .register("real", flag_plugin("real", &[]));

        let server = keel(&factory).with_config(fragment).start().await.unwrap();
        assert_eq!(server.registered_plugins(), vec!["real"]);
    }

    #[tokio::test]
    async fn test_modules_from_catalog() {
        let factory = Arc::new(MemoryServerFactory::new());
        let catalog = ModuleCatalog::empty().module(
            "keel-greeting",
            Module::namespace().export("plugin", Module::plugin(flag_plugin("greeting", &[]))),
        );
        let fragment = ConfigFragment::from_value(json!({
            "plugins": { "greeting": { "module": "keel-greeting", "options": { "to": "world" } } }
        }));

        let server = keel(&factory)
            .modules(Arc::new(catalog))
            .with_config(fragment)
            .start()
            .await
            .unwrap();
        assert!(server.app().is_set("greeting"));

        let missing = keel(&factory)
            .with_config(ConfigFragment::from_value(json!({ "plugins": { "nope": {} } })))
            .start()
            .await
            .unwrap_err();
        assert_eq!(missing.code(), ErrorCode::ModuleLoadFailed);
        assert!(missing.to_string().contains("Failed loading module nope"));
    }

    #[tokio::test]
    async fn test_module_load_failure_never_reaches_plugins_sorted() {
        let factory = Arc::new(MemoryServerFactory::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fragment = recorder(&seen).merge(json!({
            "plugins": { "entry": { "module": { "name": "no-such-module" } } }
        }));

        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ModuleLoadFailed);
        assert_eq!(err.plugin(), Some("entry"));
        assert_eq!(err.diagnosis().reason, "failed loading the module for your plugin 'entry'");
        assert_eq!(
            seen.lock().as_slice(),
            [LifecycleEvent::ConfigComposed, LifecycleEvent::ServerCreated].as_slice()
        );
    }

    #[tokio::test]
    async fn test_plugins_sorted_listeners_see_resolved_plugins() {
        let factory = Arc::new(MemoryServerFactory::new());
        let names = Arc::new(Mutex::new(Vec::new()));
        let listener_names = Arc::clone(&names);
        let fragment = ConfigFragment::new()
            .register("first", flag_plugin("first", &[]))
            .register("second", flag_plugin("second", &["first"]))
            .listener(move |emitter| {
                let names = Arc::clone(&listener_names);
                emitter.on(LifecycleEvent::PluginsSorted, move |ctx| {
                    let names = Arc::clone(&names);
                    async move {
                        match ctx.resolved() {
                            Some(resolved) => {
                                names.lock().extend(resolved.iter().map(|p| p.name.clone()));
                                Ok(())
                            }
                            None => Err("plugins not resolved".into()),
                        }
                    }
                });
            });

        keel(&factory).with_config(fragment).start().await.unwrap();
        assert_eq!(names.lock().as_slice(), ["first".to_string(), "second".to_string()].as_slice());
    }

    #[tokio::test]
    async fn test_exposed_values_reach_later_plugins() {
        let factory = Arc::new(MemoryServerFactory::new());
        let producer = Plugin::new("producer").register(|server, options| async move {
            server.app().expose("producer", "greeting", options);
            Ok(())
        });
        let consumer = Plugin::new("consumer").register(|server, _options| async move {
            match server.app().exposed("producer") {
                Some(values) => {
                    server.app().set("echo", values["greeting"].clone());
                    Ok(())
                }
                None => Err("producer exposed nothing".into()),
            }
        });
        let fragment = ConfigFragment::new()
            .plugin(
                "producer",
                PluginConfigEntry::new().priority(1).options(json!("hello")).register(producer),
            )
            .plugin("consumer", PluginConfigEntry::new().priority(2).register(consumer));

        let server = keel(&factory).with_config(fragment).start().await.unwrap();
        assert_eq!(server.registered_plugins(), vec!["producer", "consumer"]);
        assert_eq!(server.app().get("echo"), Some(json!("hello")));
        assert_eq!(server.app().exposed("consumer"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_timeout() {
        let factory = Arc::new(MemoryServerFactory::new());
        let stuck = Plugin::new("stuck").register(|_server, _options| futures::future::pending());
        let fragment = ConfigFragment::new()
            .merge(json!({ "keel": { "register_plugins_timeout": 3000 } }))
            .register("stuck", stuck);

        let started = Instant::now();
        let err = keel(&factory)
            .timeout_policy(TimeoutPolicy::enforced())
            .with_config(fragment)
            .start()
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::PluginTimeout);
        assert_eq!(err.plugin(), Some("stuck"));
        assert!(err.to_string().contains("did it forget to complete its registration?"));
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert!(started.elapsed() < Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaxed_policy_waits() {
        let factory = Arc::new(MemoryServerFactory::new());
        let slow = Plugin::new("slow").register(|server, _options| async move {
            tokio::time::sleep(Duration::from_secs(8)).await;
            server.app().set("slow", Value::Bool(true));
            Ok(())
        });

        let server = keel(&factory)
            .timeout_policy(TimeoutPolicy::relaxed())
            .with_config(ConfigFragment::new().register("slow", slow))
            .start()
            .await
            .unwrap();
        assert!(server.app().is_set("slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_listener_gates_next_phase() {
        let factory = Arc::new(MemoryServerFactory::new());
        let marks = Arc::new(Mutex::new(Vec::new()));
        let listener_marks = Arc::clone(&marks);
        let fragment = ConfigFragment::new().listener(move |emitter| {
            let marks = Arc::clone(&listener_marks);
            emitter.on(LifecycleEvent::PluginsRegistered, move |_ctx| {
                let marks = Arc::clone(&marks);
                async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    marks.lock().push(("registered-done", Instant::now()));
                    Ok(())
                }
            });
            let marks = Arc::clone(&listener_marks);
            emitter.on(LifecycleEvent::ServerStarted, move |ctx| {
                let marks = Arc::clone(&marks);
                async move {
                    assert!(ctx.server().and_then(|s| s.info()).is_some());
                    marks.lock().push(("started", Instant::now()));
                    Ok(())
                }
            });
        });

        let began = Instant::now();
        keel(&factory).with_config(fragment).start().await.unwrap();

        let marks = marks.lock();
        assert_eq!(marks[0].0, "registered-done");
        assert_eq!(marks[1].0, "started");
        assert!(marks[1].1 >= marks[0].1);
        assert!(marks[1].1 - began >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_timeout_without_listeners_is_immediate() {
        let factory = Arc::new(MemoryServerFactory::new());
        let began = Instant::now();
        keel(&factory)
            .with_config(ConfigFragment::from_value(json!({ "keel": { "event_timeout": 50 } })))
            .start()
            .await
            .unwrap();
        assert!(began.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_timeout() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::from_value(json!({ "keel": { "event_timeout": 100 } }))
            .listener(|emitter| {
                emitter.on(LifecycleEvent::PluginsSorted, |_ctx| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                });
            });

        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EventTimeout);
        assert!(err.to_string().contains("'plugins-sorted'"));
        assert!(factory.last().unwrap().info().is_none());
    }

    #[tokio::test]
    async fn test_failure_after_start_stops_server() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::new().listener(|emitter| {
            emitter.on(LifecycleEvent::ServerStarted, |_ctx| async {
                Err("listener refused".into())
            });
        });

        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EventFailed);
        let server = factory.last().unwrap();
        assert_eq!(server.stop_count(), 1);
        assert!(server.info().is_none());
    }

    #[tokio::test]
    async fn test_start_failure_is_classified() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let err = Keel::new()
            .search_path("/nonexistent/keel-bootstrap-test")
            .without_env()
            .without_logging()
            .modules(Arc::new(ModuleCatalog::empty()))
            .with_config(ConfigFragment::from_value(
                json!({ "connection": { "address": "127.0.0.1", "port": port } }),
            ))
            .start()
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::AddressInUse);
        assert!(err.diagnosis().resolution.contains(&format!("lsof -i :{port}")));
    }

    #[tokio::test]
    async fn test_server_start_error_from_factory_server() {
        #[derive(Default)]
        struct FailingFactory(MemoryServerFactory);

        impl ServerFactory for FailingFactory {
            fn create(&self, options: ServerOptions) -> keel_core::ServerResult<Arc<dyn ServerHandle>> {
                let server = self.0.create(options)?;
                if let Some(memory) = downcast_server::<MemoryServer>(&server) {
                    memory.fail_next_start(ServerError::InvalidOptions("no listener".into()));
                }
                Ok(server)
            }
        }

        let factory = Arc::new(MemoryServerFactory::new());
        let err = keel(&factory)
            .server_factory(Arc::new(FailingFactory::default()))
            .start()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerStartFailed);
    }

    #[tokio::test]
    async fn test_call_site_preserved() {
        let factory = Arc::new(MemoryServerFactory::new());
        let fragment = ConfigFragment::from_value(json!({ "keel": { "log_level": "loud" } }));

        let line = line!() + 1;
        let err = keel(&factory).with_config(fragment).start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
        assert_eq!(err.call_site().file(), file!());
        assert_eq!(err.call_site().line(), line);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_decorators_layer_below_caller() {
        let factory = Arc::new(MemoryServerFactory::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let decorator = recorder(&seen)
            .merge(json!({ "connection": { "port": 4100 }, "webapp": { "name": "decorated" } }))
            .register("from-decorator", flag_plugin("from-decorator", &[]));
        let caller = ConfigFragment::from_value(json!({ "connection": { "port": 4200 } }))
            .register("from-caller", flag_plugin("from-caller", &["from-decorator"]));

        let server = keel(&factory)
            .decorate(decorator)
            .with_config(caller)
            .start()
            .await
            .unwrap();

        assert_eq!(server.info().unwrap().port, 4200);
        assert_eq!(server.config()["webapp"]["name"], "decorated");
        assert_eq!(server.registered_plugins(), vec!["from-decorator", "from-caller"]);
        assert_eq!(seen.lock().len(), LifecycleEvent::ALL.len());
    }

    #[tokio::test]
    async fn test_start_with_callback() {
        let factory = Arc::new(MemoryServerFactory::new());
        let (tx, rx) = tokio::sync::oneshot::channel();

        keel(&factory)
            .start_with(move |result| {
                let _ = tx.send(result.map(|server| server.registered_plugins().len()));
            })
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), 0);
    }
}
