//! # Keel
//!
//! A bootstrapper for web-application servers.
//!
//! ## Overview
//!
//! Keel composes layered configuration, creates a server, orders and
//! resolves a priority-keyed map of plugins, registers them one at a time
//! under a timeout, starts listening, and emits lifecycle events that
//! listeners can observe and gate.
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌────────┐
//! │  config  │──▶│  order   │──▶│ resolve  │──▶│ register  │──▶│ start  │
//! │ composed │   │ plugins  │   │ modules  │   │ one by one│   │ server │
//! └──────────┘   └──────────┘   └──────────┘   └───────────┘   └────────┘
//!       ▲              ▲                             ▲              ▲
//!       └──────────────┴──── lifecycle events ───────┴──────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging and the bootstrap sequence
//! - **Framework**: plugin ordering, module resolution, registration, events
//! - **Transport**: the axum-backed HTTP server
//! - **Core**: plugin objects, modules and the server capability
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//!
//! #[register_module(name = "hello")]
//! fn hello() -> Module {
//!     Module::plugin(Plugin::new("hello").register(|server, _options| async move {
//!         let http = downcast_server::<HttpServer>(&server).ok_or("not an HTTP server")?;
//!         http.route("/hello", axum::routing::get(|| async { "hello" }))?;
//!         Ok(())
//!     }))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConfigFragment::from_value(serde_json::json!({
//!         "plugins": { "hello": { "priority": 10 } }
//!     }));
//!     let server = Keel::new().with_config(config).start().await.unwrap();
//!     tokio::signal::ctrl_c().await.ok();
//!     server.stop().await.ok();
//! }
//! ```
//!
//! `#[register_module]` expands to paths under `keel_core`, so crates using it
//! depend on `keel-core` directly.
//!
//! ## Features
//!
//! - `json-log`: JSON log output

pub use keel_core as core;
pub use keel_framework as framework;
pub use keel_runtime as runtime;
pub use keel_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use keel::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use keel_runtime::{ConfigFragment, ErrorCode, Keel, StartError};

    // Plugins and modules
    pub use keel_core::{Module, Plugin, PluginPkg};
    pub use keel_framework::{ModuleCatalog, ModuleSpec, PluginConfigEntry};
    pub use keel_macros::register_module;

    // Lifecycle events
    pub use keel_framework::{LifecycleContext, LifecycleEmitter, LifecycleEvent};

    // Server capability
    pub use keel_core::{ServerHandle, downcast_server};
    pub use keel_transport::HttpServer;
}
