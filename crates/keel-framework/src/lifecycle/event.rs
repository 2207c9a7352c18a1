use std::fmt;
use std::str::FromStr;

/// A phase transition of a bootstrap invocation.
///
/// Events are emitted in declaration order, each at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleEvent {
    /// Configuration has been merged.
    ConfigComposed,
    /// The server instance exists.
    ServerCreated,
    /// The plugins mapping has been ordered.
    PluginsSorted,
    /// Every plugin has been registered.
    PluginsRegistered,
    /// The server is listening.
    ServerStarted,
    /// Startup finished.
    Complete,
}

impl LifecycleEvent {
    /// Every event, in emission order.
    pub const ALL: [Self; 6] = [
        Self::ConfigComposed,
        Self::ServerCreated,
        Self::PluginsSorted,
        Self::PluginsRegistered,
        Self::ServerStarted,
        Self::Complete,
    ];

    /// Stable event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigComposed => "config-composed",
            Self::ServerCreated => "server-created",
            Self::PluginsSorted => "plugins-sorted",
            Self::PluginsRegistered => "plugins-registered",
            Self::ServerStarted => "server-started",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unknown lifecycle event '{s}'"))
    }
}
