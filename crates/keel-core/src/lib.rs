//! # Keel Core
//!
//! Shared building blocks for the Keel server bootstrapper.
//!
//! - **Plugins**: the plugin object with its identity and registration
//!   function ([`Plugin`], [`PluginPkg`])
//! - **Modules**: exported values and the link-time module registry
//!   ([`Module`], [`ModuleEntry`], [`MODULE_REGISTRY`])
//! - **Server capability**: the traits the bootstrapper drives
//!   ([`ServerFactory`], [`ServerHandle`])
//! - **Errors**: [`ServerError`] and the type-erased [`BoxError`]
//! - **Memory server**: a listener-less [`ServerHandle`] for dry runs and
//!   tests ([`MemoryServer`])

pub mod error;
pub mod memory;
pub mod module;
pub mod plugin;
pub mod server;

pub use error::{BoxError, ServerError, ServerResult};
pub use memory::{MemoryServer, MemoryServerFactory};
pub use module::{MODULE_REGISTRY, Module, ModuleEntry, registered_module};
pub use plugin::{Plugin, PluginPkg, RegisterFn};
pub use server::{
    AppState, ServerFactory, ServerHandle, ServerInfo, ServerOptions, downcast_server,
    invoke_register,
};

pub use futures::future::BoxFuture;

// Re-exported for `#[register_module]` expansions.
pub use linkme;
