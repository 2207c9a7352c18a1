//! Lifecycle events of a bootstrap invocation.
//!
//! ```text
//! config-composed → server-created → plugins-sorted →
//! plugins-registered → server-started → complete
//! ```
//!
//! Listeners are attached to a [`LifecycleEmitter`] before the first event and
//! receive the invocation's [`LifecycleContext`]. A failing or slow listener
//! fails the emission and, with it, the bootstrap.

mod context;
mod emitter;
mod event;

pub use context::LifecycleContext;
pub use emitter::{LifecycleEmitter, Listener, ListenerSetup};
pub use event::LifecycleEvent;
