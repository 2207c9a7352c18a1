//! The `plugins` configuration section.
//!
//! ```toml
//! [plugins]
//! require_from_path = "./server/plugins"
//!
//! [plugins.auth]
//! priority = 10
//! module = "keel-auth"
//! options = { strategy = "session" }
//!
//! [plugins.legacy]
//! enable = false
//! ```
//!
//! Entries keep the order of the configuration source. A direct plugin object
//! (`register`) can only be attached programmatically.

use indexmap::IndexMap;
use keel_core::{Plugin, PluginPkg};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key of the plugins mapping that holds the global base path.
pub const REQUIRE_FROM_PATH_KEY: &str = "require_from_path";

/// The `plugins` mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Global base path for module loading. Validated as a string when the
    /// plugins are ordered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_from_path: Option<Value>,

    /// Plugin entries keyed by name, in source order.
    #[serde(flatten)]
    pub entries: IndexMap<String, PluginConfigEntry>,
}

impl PluginsConfig {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn plugin(mut self, key: impl Into<String>, entry: PluginConfigEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    /// Sets the global base path.
    pub fn with_require_from_path(mut self, path: impl Into<String>) -> Self {
        self.require_from_path = Some(Value::String(path.into()));
        self
    }

    /// Attaches a direct plugin object to an entry, creating the entry if the
    /// configuration does not mention it.
    pub fn attach_register(&mut self, key: &str, plugin: Plugin) {
        self.entries.entry(key.to_owned()).or_default().register = Some(plugin);
    }

    /// Number of entries, including disabled ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One entry of the plugins mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfigEntry {
    /// Identity override; defaults to the mapping key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number or numeric string; anything else sorts last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,

    /// `false` removes the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,

    /// Where the plugin comes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleSpec>,

    /// Per-entry base path for module loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_from_path: Option<Value>,

    /// Identity used when the direct plugin object has no name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<PluginPkg>,

    /// Passed to the plugin at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,

    /// Direct plugin object; bypasses module loading.
    #[serde(skip)]
    pub register: Option<Plugin>,
}

impl PluginConfigEntry {
    /// Creates an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity override.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: impl Into<Value>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Enables or disables the entry.
    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    /// Sets where the module comes from.
    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.module = Some(module);
        self
    }

    /// Sets the per-entry base path.
    pub fn require_from_path(mut self, path: impl Into<String>) -> Self {
        self.require_from_path = Some(Value::String(path.into()));
        self
    }

    /// Sets package metadata.
    pub fn pkg(mut self, pkg: PluginPkg) -> Self {
        self.pkg = Some(pkg);
        self
    }

    /// Sets the options.
    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the direct plugin object.
    pub fn register(mut self, plugin: Plugin) -> Self {
        self.register = Some(plugin);
        self
    }

    /// Whether the entry takes part in ordering.
    pub fn is_enabled(&self) -> bool {
        self.enable != Some(false)
    }
}

/// The `module` field of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleSpec {
    /// `false` disables loading; `true` behaves as if the field were absent.
    Enabled(bool),
    /// Module identity.
    Name(String),
    /// Module identity with its own base path.
    Object {
        /// Module identity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Overrides the entry and global base paths.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        require_from_path: Option<Value>,
    },
}

impl ModuleSpec {
    /// A module given by identity.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// A module given by identity and base path.
    pub fn from_path(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Object {
            name: Some(name.into()),
            require_from_path: Some(Value::String(path.into())),
        }
    }
}
