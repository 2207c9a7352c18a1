//! The plugin object registered with a server.
//!
//! A [`Plugin`] is what a module exports: an identity (a name of its own or
//! one borrowed from its package metadata) plus an asynchronous registration
//! function that receives the server handle and the plugin's options.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BoxError;
use crate::server::ServerHandle;

/// Registration function of a plugin.
pub type RegisterFn =
    Arc<dyn Fn(Arc<dyn ServerHandle>, Value) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Package metadata attached to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPkg {
    /// Package name.
    pub name: String,
    /// Package version.
    #[serde(default)]
    pub version: Option<String>,
}

impl PluginPkg {
    /// Creates package metadata with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Sets the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A plugin object.
///
/// Plugins are cheap to clone; the registration function is shared.
///
/// # Example
///
/// ```rust,ignore
/// let plugin = Plugin::new("health").register(|server, _options| async move {
///     server.app().set("health", true.into());
///     Ok(())
/// });
/// ```
#[derive(Clone, Default)]
pub struct Plugin {
    name: Option<String>,
    pkg: Option<PluginPkg>,
    register: Option<RegisterFn>,
}

impl Plugin {
    /// Creates a plugin with its own name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Creates a plugin without a name; it must get one from [`PluginPkg`].
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Attaches package metadata.
    pub fn with_pkg(mut self, pkg: PluginPkg) -> Self {
        self.pkg = Some(pkg);
        self
    }

    /// Sets the registration function.
    pub fn register<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<dyn ServerHandle>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register = Some(Arc::new(move |server, options| Box::pin(f(server, options))));
        self
    }

    /// The plugin's identity: its own name, or the package name.
    ///
    /// Empty strings count as missing.
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.pkg
                    .as_ref()
                    .map(|pkg| pkg.name.as_str())
                    .filter(|name| !name.is_empty())
            })
    }

    /// Package metadata, if any.
    pub fn pkg(&self) -> Option<&PluginPkg> {
        self.pkg.as_ref()
    }

    /// Package version, if any.
    pub fn version(&self) -> Option<&str> {
        self.pkg.as_ref().and_then(|pkg| pkg.version.as_deref())
    }

    /// Whether the plugin carries a registration function.
    pub fn has_register(&self) -> bool {
        self.register.is_some()
    }

    /// The registration function, if any.
    pub fn register_fn(&self) -> Option<&RegisterFn> {
        self.register.as_ref()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("pkg", &self.pkg)
            .field("has_register", &self.register.is_some())
            .finish()
    }
}
