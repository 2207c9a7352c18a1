//! Module exports and the link-time module registry.
//!
//! A module is whatever a loader hands back for a module identity. It is
//! either a plugin object or a namespace of named exports, which may nest.
//! Modules compiled into the binary are collected in [`MODULE_REGISTRY`],
//! usually through the `#[register_module]` attribute.

use std::collections::BTreeMap;
use std::fmt;

use linkme::distributed_slice;

use crate::plugin::Plugin;

/// Value exported by a module.
#[derive(Debug, Clone)]
pub enum Module {
    /// The module has no usable value.
    Empty,
    /// A plugin object.
    Plugin(Plugin),
    /// A namespace of named exports.
    Namespace(BTreeMap<String, Module>),
}

impl Module {
    /// Wraps a plugin object.
    pub fn plugin(plugin: Plugin) -> Self {
        Self::Plugin(plugin)
    }

    /// Creates an empty namespace.
    pub fn namespace() -> Self {
        Self::Namespace(BTreeMap::new())
    }

    /// Adds a named export. Turns a non-namespace value into a namespace.
    pub fn export(self, key: impl Into<String>, value: Module) -> Self {
        let mut exports = match self {
            Self::Namespace(exports) => exports,
            _ => BTreeMap::new(),
        };
        exports.insert(key.into(), value);
        Self::Namespace(exports)
    }

    /// Follows a path of export names.
    pub fn get(&self, path: &[&str]) -> Option<&Module> {
        path.iter().try_fold(self, |current, key| match current {
            Self::Namespace(exports) => exports.get(*key),
            _ => None,
        })
    }

    /// The plugin object, if this value is one.
    pub fn as_plugin(&self) -> Option<&Plugin> {
        match self {
            Self::Plugin(plugin) => Some(plugin),
            _ => None,
        }
    }

    /// Short description of the value's shape, logged when a module loads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Plugin(_) => "plugin",
            Self::Namespace(_) => "namespace",
        }
    }
}

impl From<Plugin> for Module {
    fn from(plugin: Plugin) -> Self {
        Self::Plugin(plugin)
    }
}

// =============================================================================
// Link-time Registry
// =============================================================================

/// A module compiled into the binary.
pub struct ModuleEntry {
    /// Ambient module name.
    pub name: &'static str,
    /// Filesystem location the module is also reachable under, relative to
    /// the working directory unless absolute.
    pub path: Option<&'static str>,
    /// Produces the module's exports.
    pub load: fn() -> Module,
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Every module registered with `#[register_module]`.
#[distributed_slice]
pub static MODULE_REGISTRY: [ModuleEntry];

/// Looks up a registered module by name.
pub fn registered_module(name: &str) -> Option<&'static ModuleEntry> {
    MODULE_REGISTRY.iter().find(|entry| entry.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[distributed_slice(MODULE_REGISTRY)]
    static TEST_MODULE: ModuleEntry = ModuleEntry {
        name: "keel-core-test-module",
        path: None,
        load: || Module::plugin(Plugin::new("core-test")),
    };

    #[test]
    fn test_get_follows_nested_exports() {
        let module = Module::namespace().export(
            "default",
            Module::namespace().export("plugin", Module::plugin(Plugin::new("nested"))),
        );

        let found = module.get(&["default", "plugin"]).and_then(Module::as_plugin);
        assert_eq!(found.and_then(Plugin::name), Some("nested"));
        assert!(module.get(&["default", "hapi_plugin"]).is_none());
        assert!(module.get(&["default", "plugin", "deeper"]).is_none());
        assert_eq!(module.get(&[]).map(Module::kind), Some("namespace"));
    }

    #[test]
    fn test_registered_module_lookup() {
        let entry = registered_module("keel-core-test-module");
        assert!(entry.is_some());
        let module = entry.map(|entry| (entry.load)());
        assert_eq!(module.map(|m| m.kind()), Some("plugin"));
        assert!(registered_module("missing").is_none());
    }
}
