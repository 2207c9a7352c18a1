//! # Keel Transport
//!
//! The HTTP implementation of the server capability defined in `keel-core`.
//!
//! ```text
//! ┌──────────────────────┐
//! │  keel-runtime        │  (bootstrap: create, register, start)
//! ├──────────────────────┤
//! │  keel-core           │  (ServerFactory / ServerHandle traits)
//! ├──────────────────────┤
//! │  keel-transport      │  <- This crate (axum server)
//! ├──────────────────────┤
//! │  Network (TCP/HTTP)  │
//! └──────────────────────┘
//! ```
//!
//! Plugins add routes by downcasting the handle they receive:
//!
//! ```rust,ignore
//! use axum::routing::get;
//! use keel_core::{Plugin, downcast_server};
//! use keel_transport::HttpServer;
//!
//! let plugin = Plugin::new("hello").register(|server, _options| async move {
//!     let http = downcast_server::<HttpServer>(&server).ok_or("not an HTTP server")?;
//!     http.route("/hello", get(|| async { "hello" }))?;
//!     Ok(())
//! });
//! ```

pub mod http;

pub use http::{HttpServer, HttpServerFactory};
