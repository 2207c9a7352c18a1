use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use keel_core::BoxError;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::LifecycleContext;
use crate::lifecycle::event::LifecycleEvent;

/// A lifecycle listener.
pub type Listener =
    Arc<dyn Fn(Arc<LifecycleContext>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Attaches listeners to an emitter. Decorators and callers supply these.
pub type ListenerSetup = Arc<dyn Fn(&LifecycleEmitter) + Send + Sync>;

/// Typed publish/subscribe for lifecycle events, scoped to one bootstrap
/// invocation.
///
/// Emitting an event runs all of its listeners concurrently and waits for
/// them. With an event timeout, listeners that have not all finished in time
/// fail the emission with [`LifecycleError::Timeout`]; events without
/// listeners always succeed immediately.
pub struct LifecycleEmitter {
    listeners: RwLock<HashMap<LifecycleEvent, Vec<Listener>>>,
    event_timeout: Option<Duration>,
}

impl LifecycleEmitter {
    /// Creates an emitter without an event timeout.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            event_timeout: None,
        }
    }

    /// Sets the event timeout. A zero duration means no timeout.
    pub fn with_event_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.event_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// The event timeout, if any.
    pub fn event_timeout(&self) -> Option<Duration> {
        self.event_timeout
    }

    /// Adds a listener for an event.
    pub fn on<F, Fut>(&self, event: LifecycleEvent, listener: F)
    where
        F: Fn(Arc<LifecycleContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let listener: Listener = Arc::new(move |ctx| Box::pin(listener(ctx)));
        self.listeners.write().entry(event).or_default().push(listener);
    }

    /// Runs a listener setup function against this emitter.
    pub fn attach(&self, setup: &ListenerSetup) {
        setup(self);
    }

    /// Number of listeners for an event.
    pub fn listener_count(&self, event: LifecycleEvent) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    /// Emits an event and waits for its listeners.
    pub async fn emit(&self, event: LifecycleEvent, ctx: &Arc<LifecycleContext>) -> LifecycleResult<()> {
        let listeners = self.listeners.read().get(&event).cloned().unwrap_or_default();
        if listeners.is_empty() {
            debug!(event = %event, "No listeners");
            return Ok(());
        }

        debug!(event = %event, listeners = listeners.len(), "Emitting lifecycle event");
        let all = future::try_join_all(listeners.iter().map(|listener| listener(Arc::clone(ctx))));

        let joined = match self.event_timeout {
            Some(timeout) => tokio::time::timeout(timeout, all).await.map_err(|_| {
                warn!(event = %event, timeout_ms = timeout.as_millis() as u64, "Lifecycle event timed out");
                LifecycleError::Timeout { event, timeout }
            })?,
            None => all.await,
        };

        joined.map(|_| ()).map_err(|source| {
            warn!(event = %event, error = %source, "Lifecycle listener failed");
            LifecycleError::Failed { event, source }
        })
    }
}

impl Default for LifecycleEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<LifecycleEvent, usize> = self
            .listeners
            .read()
            .iter()
            .map(|(event, listeners)| (*event, listeners.len()))
            .collect();
        f.debug_struct("LifecycleEmitter")
            .field("listeners", &counts)
            .field("event_timeout", &self.event_timeout)
            .finish()
    }
}
