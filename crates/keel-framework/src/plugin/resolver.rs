//! Module resolution for ordered plugin entries.
//!
//! For each [`OrderedPlugin`] the [`PluginResolver`]:
//!
//! 1. takes the direct plugin object when the entry has one, without loading
//!    anything,
//! 2. otherwise works out the module identity and the loading strategy
//!    ([`ModuleRequest`]) and asks the [`ModuleLoader`] for the module,
//! 3. normalizes the export shape over [`EXPORT_ACCESSORS`],
//! 4. validates that the result is a named plugin object with a registration
//!    function.
//!
//! [`ModuleCatalog`] is the default loader. It serves modules compiled into
//! the binary (the `#[register_module]` registry) plus modules added at
//! runtime, by name or by filesystem path.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use keel_core::{BoxError, MODULE_REGISTRY, Module, Plugin, registered_module};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{ModuleNotFound, PluginError, PluginResult};
use crate::plugin::config::ModuleSpec;
use crate::plugin::descriptor::OrderedPlugin;

/// Export paths searched for the plugin object, in order.
pub const EXPORT_ACCESSORS: &[&[&str]] = &[
    &["default", "hapi_plugin"],
    &["hapi_plugin"],
    &["default", "plugin"],
    &["plugin"],
    &["default"],
];

// =============================================================================
// Module Loading
// =============================================================================

/// How a module identity is located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRequest {
    /// An ambient module name.
    Ambient(String),
    /// A filesystem path, already resolved against the working directory.
    Relative(PathBuf),
    /// An identity resolved from an explicit base directory.
    FromPath {
        /// Base directory, already resolved against the working directory.
        base: PathBuf,
        /// Module identity.
        identity: String,
    },
}

impl fmt::Display for ModuleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient(name) => write!(f, "{name}"),
            Self::Relative(path) => write!(f, "{}", path.display()),
            Self::FromPath { base, identity } => write!(f, "{identity} (from {})", base.display()),
        }
    }
}

/// Loads modules.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Loads the module a request points at.
    async fn load(&self, request: &ModuleRequest) -> Result<Module, BoxError>;
}

type LoadFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Module, BoxError>> + Send + Sync>;

/// The default [`ModuleLoader`].
///
/// Path-keyed modules are matched after lexical normalization, so
/// `./plugins/../plugins/auth` and `plugins/auth` name the same module.
#[derive(Clone)]
pub struct ModuleCatalog {
    cwd: PathBuf,
    use_registry: bool,
    named: HashMap<String, LoadFn>,
    paths: HashMap<PathBuf, LoadFn>,
}

impl ModuleCatalog {
    /// Creates a catalog backed by the link-time module registry.
    pub fn new() -> Self {
        Self {
            cwd: current_dir(),
            use_registry: true,
            named: HashMap::new(),
            paths: HashMap::new(),
        }
    }

    /// Creates a catalog that ignores the link-time registry.
    pub fn empty() -> Self {
        Self {
            use_registry: false,
            ..Self::new()
        }
    }

    /// Sets the directory relative registered paths are resolved against.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Adds an ambient module.
    pub fn module(self, name: impl Into<String>, module: Module) -> Self {
        self.module_fn(name, move || {
            let module = module.clone();
            async move { Ok(module) }
        })
    }

    /// Adds an ambient module produced by an async function.
    pub fn module_fn<F, Fut>(mut self, name: impl Into<String>, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Module, BoxError>> + Send + 'static,
    {
        self.named.insert(name.into(), boxed_load(load));
        self
    }

    /// Adds a module reachable by filesystem path.
    pub fn path_module(self, path: impl AsRef<Path>, module: Module) -> Self {
        self.path_module_fn(path, move || {
            let module = module.clone();
            async move { Ok(module) }
        })
    }

    /// Adds a module reachable by filesystem path, produced by an async
    /// function.
    pub fn path_module_fn<F, Fut>(mut self, path: impl AsRef<Path>, load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Module, BoxError>> + Send + 'static,
    {
        let key = normalize_path(&self.cwd.join(path));
        self.paths.insert(key, boxed_load(load));
        self
    }

    async fn load_named(&self, name: &str) -> Result<Module, BoxError> {
        if let Some(load) = self.named.get(name) {
            return load().await;
        }
        if self.use_registry {
            if let Some(entry) = registered_module(name) {
                return Ok((entry.load)());
            }
        }
        Err(ModuleNotFound(name.to_owned()).into())
    }

    async fn load_path(&self, path: &Path) -> Option<Result<Module, BoxError>> {
        let key = normalize_path(path);
        if let Some(load) = self.paths.get(&key) {
            return Some(load().await);
        }
        if self.use_registry {
            let entry = MODULE_REGISTRY.iter().find(|entry| {
                entry
                    .path
                    .is_some_and(|p| normalize_path(&self.cwd.join(p)) == key)
            });
            if let Some(entry) = entry {
                return Some(Ok((entry.load)()));
            }
        }
        None
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("cwd", &self.cwd)
            .field("use_registry", &self.use_registry)
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .field("paths", &self.paths.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ModuleLoader for ModuleCatalog {
    async fn load(&self, request: &ModuleRequest) -> Result<Module, BoxError> {
        match request {
            ModuleRequest::Ambient(name) => self.load_named(name).await,
            ModuleRequest::Relative(path) => self
                .load_path(path)
                .await
                .unwrap_or_else(|| Err(ModuleNotFound(path.display().to_string()).into())),
            ModuleRequest::FromPath { base, identity } => {
                if let Some(result) = self.load_path(&base.join(identity)).await {
                    return result;
                }
                // Bare names fall back to ambient lookup.
                if is_path_like(identity) {
                    Err(ModuleNotFound(base.join(identity).display().to_string()).into())
                } else {
                    self.load_named(identity).await
                }
            }
        }
    }
}

fn boxed_load<F, Fut>(load: F) -> LoadFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Module, BoxError>> + Send + 'static,
{
    Arc::new(move || Box::pin(load()))
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn is_path_like(identity: &str) -> bool {
    identity.starts_with('.') || Path::new(identity).is_absolute()
}

/// Resolves `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

// =============================================================================
// Resolution
// =============================================================================

/// How a plugin was obtained; used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTrace {
    /// Loaded from a module.
    Module {
        /// Module identity.
        module: String,
        /// Base path, when one applied.
        path: Option<String>,
    },
    /// Given directly as a plugin object.
    Direct,
}

impl LoadTrace {
    /// Trace for a module load.
    pub fn module(module: impl Into<String>, path: Option<String>) -> Self {
        Self::Module {
            module: module.into(),
            path,
        }
    }

    /// Trace for a direct plugin object.
    pub fn direct() -> Self {
        Self::Direct
    }
}

impl fmt::Display for LoadTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { module, path: None } => write!(f, "with module '{module}'"),
            Self::Module {
                module,
                path: Some(path),
            } => write!(f, "with module '{module}' from path: '{path}'"),
            Self::Direct => f.write_str("with register function"),
        }
    }
}

/// A plugin ready for registration.
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    /// Plugin identity from the configuration.
    pub name: String,
    /// The validated plugin object.
    pub plugin: Plugin,
    /// Registration options.
    pub options: Value,
    /// How the plugin was obtained.
    pub trace: LoadTrace,
}

/// Resolves ordered entries into plugin objects.
#[derive(Clone)]
pub struct PluginResolver {
    loader: Arc<dyn ModuleLoader>,
    cwd: PathBuf,
}

impl PluginResolver {
    /// Creates a resolver using the given loader.
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            cwd: current_dir(),
        }
    }

    /// Sets the directory relative identities and base paths resolve against.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Resolves every entry concurrently. Output order equals input order.
    ///
    /// The first failure fails the whole batch.
    pub async fn resolve_all(&self, entries: &[OrderedPlugin]) -> PluginResult<Vec<ResolvedPlugin>> {
        future::try_join_all(entries.iter().map(|entry| self.resolve(entry))).await
    }

    /// Resolves a single entry.
    #[instrument(skip_all, fields(plugin = %entry.name))]
    pub async fn resolve(&self, entry: &OrderedPlugin) -> PluginResult<ResolvedPlugin> {
        if let Some(plugin) = &entry.register {
            let plugin = match (&entry.pkg, plugin.pkg()) {
                (Some(pkg), None) => plugin.clone().with_pkg(pkg.clone()),
                _ => plugin.clone(),
            };
            debug!("Using direct plugin object");
            return validate(entry, Module::Plugin(plugin), LoadTrace::direct());
        }

        let (identity, module_base) = match &entry.module {
            None | Some(ModuleSpec::Enabled(true)) => (entry.name.clone(), None),
            Some(ModuleSpec::Enabled(false)) => {
                return Err(PluginError::ModuleDisabled {
                    plugin: entry.name.clone(),
                });
            }
            Some(ModuleSpec::Name(name)) if name.is_empty() => (entry.name.clone(), None),
            Some(ModuleSpec::Name(name)) => (name.clone(), None),
            Some(ModuleSpec::Object {
                name,
                require_from_path,
            }) => {
                let name = name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| PluginError::ModuleNameMissing {
                        plugin: entry.name.clone(),
                    })?;
                (name, require_from_path.as_ref().and_then(Value::as_str))
            }
        };

        let base = module_base
            .or(entry.require_from_path.as_deref())
            .or(entry.global_require_from_path.as_deref())
            .map(str::to_owned);

        let request = match &base {
            Some(base) => ModuleRequest::FromPath {
                base: self.cwd.join(base),
                identity: identity.clone(),
            },
            None if is_path_like(&identity) => ModuleRequest::Relative(self.cwd.join(&identity)),
            None => ModuleRequest::Ambient(identity.clone()),
        };

        debug!(request = %request, "Loading plugin module");
        let module = self
            .loader
            .load(&request)
            .await
            .map_err(|source| PluginError::ModuleLoad {
                plugin: entry.name.clone(),
                module: identity.clone(),
                path: base.clone(),
                source,
            })?;
        debug!(kind = module.kind(), "Plugin module loaded");

        validate(
            entry,
            normalize_exports(module),
            LoadTrace::module(identity, base),
        )
    }
}

impl fmt::Debug for PluginResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginResolver")
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

/// Picks the plugin object out of a module's exports.
///
/// The first accessor in [`EXPORT_ACCESSORS`] that lands on a plugin object
/// wins; otherwise the module is returned as is.
pub fn normalize_exports(module: Module) -> Module {
    EXPORT_ACCESSORS
        .iter()
        .find_map(|path| match module.get(path) {
            Some(found @ Module::Plugin(_)) => Some(found.clone()),
            _ => None,
        })
        .unwrap_or(module)
}

fn validate(entry: &OrderedPlugin, module: Module, trace: LoadTrace) -> PluginResult<ResolvedPlugin> {
    let invalid = |reason: &'static str| PluginError::Invalid {
        plugin: entry.name.clone(),
        trace: trace.clone(),
        reason,
    };

    let plugin = match module {
        Module::Plugin(plugin) => plugin,
        Module::Empty => return Err(invalid("module has no value")),
        Module::Namespace(_) => return Err(invalid("module does not export a plugin object")),
    };
    if plugin.name().is_none() {
        return Err(invalid("plugin object does not expose a name"));
    }
    if !plugin.has_register() {
        return Err(invalid("plugin object does not expose a register function"));
    }

    Ok(ResolvedPlugin {
        name: entry.name.clone(),
        plugin,
        options: entry.options.clone(),
        trace,
    })
}
