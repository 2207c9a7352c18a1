//! The plugin pipeline.
//!
//! ```text
//! PluginsConfig ──order_plugins──► [OrderedPlugin]
//!               ──PluginResolver──► [ResolvedPlugin]   (concurrent)
//!               ──PluginRegistrar──► server            (sequential, timed)
//! ```
//!
//! - [`config`]: the `plugins` configuration mapping
//! - [`descriptor`]: priority ordering
//! - [`resolver`]: module loading and export-shape normalization
//! - [`registrar`]: timed sequential registration

pub mod config;
pub mod descriptor;
pub mod registrar;
pub mod resolver;

pub use config::{ModuleSpec, PluginConfigEntry, PluginsConfig, REQUIRE_FROM_PATH_KEY};
pub use descriptor::{OrderedPlugin, order_plugins, priority_key};
pub use registrar::{DEFAULT_REGISTER_TIMEOUT, PluginRegistrar, TimeoutPolicy};
pub use resolver::{
    EXPORT_ACCESSORS, LoadTrace, ModuleCatalog, ModuleLoader, ModuleRequest, PluginResolver,
    ResolvedPlugin, normalize_exports, normalize_path,
};
