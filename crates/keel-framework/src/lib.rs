//! # Keel Framework
//!
//! The plugin pipeline and lifecycle events of the Keel server bootstrapper.
//!
//! This layer provides:
//! - Priority ordering of the `plugins` configuration mapping
//! - Module resolution with export-shape normalization
//! - Timed, strictly sequential plugin registration
//! - A typed lifecycle emitter whose listeners can gate each phase
//!
//! It drives the server only through the capability traits in `keel-core`;
//! configuration loading and the bootstrap sequence live in `keel-runtime`.

pub mod error;
pub mod lifecycle;
pub mod plugin;

pub use error::{
    LifecycleError, LifecycleResult, ModuleNotFound, PluginError, PluginResult,
};
pub use lifecycle::{LifecycleContext, LifecycleEmitter, LifecycleEvent, Listener, ListenerSetup};
pub use plugin::{
    DEFAULT_REGISTER_TIMEOUT, LoadTrace, ModuleCatalog, ModuleLoader, ModuleRequest, ModuleSpec,
    OrderedPlugin, PluginConfigEntry, PluginRegistrar, PluginResolver, PluginsConfig,
    ResolvedPlugin, TimeoutPolicy, order_plugins,
};
