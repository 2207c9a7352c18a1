//! Programmatic configuration layers.
//!
//! A [`ConfigFragment`] is what a decorator or the caller contributes on top
//! of files and environment: JSON values, direct plugin objects keyed by
//! plugin name, and an optional listener setup function. JSON values are
//! deep-merged in layer order; plugin objects are merged by key; listener
//! setups are all kept and attached in layer order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use keel_core::Plugin;
use keel_framework::{LifecycleEmitter, ListenerSetup, PluginConfigEntry};
use serde_json::{Map, Value, json};

use super::loader::merge_values;

/// One programmatic configuration layer.
#[derive(Clone, Default)]
pub struct ConfigFragment {
    values: Value,
    registers: IndexMap<String, Plugin>,
    listener: Option<ListenerSetup>,
}

impl ConfigFragment {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self {
            values: Value::Object(Map::new()),
            ..Self::default()
        }
    }

    /// Creates a fragment from JSON values.
    pub fn from_value(values: Value) -> Self {
        Self::new().merge(values)
    }

    /// Deep-merges JSON values into this fragment.
    pub fn merge(mut self, values: Value) -> Self {
        merge_values(&mut self.values, values);
        self
    }

    /// Sets the listener port.
    pub fn port(self, port: u16) -> Self {
        self.merge(json!({ "connection": { "port": port } }))
    }

    /// Adds a plugin entry. A direct plugin object on the entry travels beside
    /// the JSON and is attached after the layers are merged.
    pub fn plugin(mut self, key: impl Into<String>, mut entry: PluginConfigEntry) -> Self {
        let key = key.into();
        if let Some(plugin) = entry.register.take() {
            self.registers.insert(key.clone(), plugin);
        }
        let entry = serde_json::to_value(&entry).unwrap_or_else(|_| Value::Object(Map::new()));
        self.merge(json!({ "plugins": { key: entry } }))
    }

    /// Adds a direct plugin object under a key.
    pub fn register(self, key: impl Into<String>, plugin: Plugin) -> Self {
        self.plugin(key, PluginConfigEntry::new().register(plugin))
    }

    /// Sets the listener setup function, replacing any earlier one.
    pub fn listener<F>(mut self, setup: F) -> Self
    where
        F: Fn(&LifecycleEmitter) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(setup));
        self
    }

    /// The JSON values.
    pub fn values(&self) -> &Value {
        &self.values
    }

    /// Direct plugin objects by key.
    pub fn registers(&self) -> &IndexMap<String, Plugin> {
        &self.registers
    }

    /// The listener setup function, if any.
    pub fn listener_setup(&self) -> Option<&ListenerSetup> {
        self.listener.as_ref()
    }
}

impl fmt::Debug for ConfigFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigFragment")
            .field("values", &self.values)
            .field("registers", &self.registers.keys().collect::<Vec<_>>())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
