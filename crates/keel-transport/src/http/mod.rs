//! HTTP server capability built on axum.

mod server;

pub use server::{HttpServer, HttpServerFactory};
