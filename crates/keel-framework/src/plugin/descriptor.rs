//! Ordering of the plugins mapping.
//!
//! [`order_plugins`] turns the mapping into a priority-sorted list of
//! [`OrderedPlugin`]s:
//!
//! - the reserved `require_from_path` key is configuration, never a plugin,
//! - entries with `enable = false` are dropped,
//! - numeric strings sort by their leading integer (`"10abc"` is 10),
//! - absent or non-numeric priorities sort last,
//! - equal priorities keep the order of the configuration source.

use std::cmp::Ordering;

use keel_core::{Plugin, PluginPkg};
use serde_json::Value;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::plugin::config::{ModuleSpec, PluginConfigEntry, PluginsConfig};

/// An enabled plugin entry in registration order.
///
/// Owns copies of the entry's fields; the source mapping is never touched.
#[derive(Debug, Clone)]
pub struct OrderedPlugin {
    /// Plugin identity.
    pub name: String,
    /// Sort key; `f64::INFINITY` when the priority is absent or not numeric.
    pub priority: f64,
    /// Where the module comes from.
    pub module: Option<ModuleSpec>,
    /// Direct plugin object.
    pub register: Option<Plugin>,
    /// Package metadata for a direct plugin object.
    pub pkg: Option<PluginPkg>,
    /// Per-entry base path.
    pub require_from_path: Option<String>,
    /// Global base path from the plugins mapping.
    pub global_require_from_path: Option<String>,
    /// Registration options.
    pub options: Value,
}

impl OrderedPlugin {
    /// Builds an ordered entry from a mapping entry.
    fn from_entry(
        key: &str,
        entry: &PluginConfigEntry,
        global_require_from_path: Option<&str>,
    ) -> PluginResult<Self> {
        let name = entry
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(key)
            .to_owned();

        let location = || format!("plugin '{name}'");
        let require_from_path = base_path(entry.require_from_path.as_ref(), location)?;
        if let Some(ModuleSpec::Object {
            require_from_path: Some(path),
            ..
        }) = &entry.module
        {
            base_path(Some(path), location)?;
        }

        Ok(Self {
            priority: priority_key(entry.priority.as_ref()),
            module: entry.module.clone(),
            register: entry.register.clone(),
            pkg: entry.pkg.clone(),
            require_from_path,
            global_require_from_path: global_require_from_path.map(str::to_owned),
            options: entry.options.clone().unwrap_or(Value::Null),
            name,
        })
    }

    /// Whether the priority is unset or not numeric.
    pub fn is_unprioritized(&self) -> bool {
        self.priority == f64::INFINITY
    }
}

/// Orders the enabled entries of a plugins mapping by priority.
///
/// # Errors
///
/// Returns [`PluginError::InvalidBasePath`] when the global or any per-entry
/// `require_from_path` is not a string.
pub fn order_plugins(config: &PluginsConfig) -> PluginResult<Vec<OrderedPlugin>> {
    let global = base_path(config.require_from_path.as_ref(), || "plugins".to_owned())?;

    let mut ordered = config
        .entries
        .iter()
        .filter(|(_, entry)| entry.is_enabled())
        .map(|(key, entry)| OrderedPlugin::from_entry(key, entry, global.as_deref()))
        .collect::<PluginResult<Vec<_>>>()?;

    // `sort_by` is stable: ties keep source order.
    ordered.sort_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap_or(Ordering::Equal));

    debug!(
        count = ordered.len(),
        skipped = config.entries.len() - ordered.len(),
        "Plugins ordered"
    );

    Ok(ordered)
}

/// Sort key for a priority value.
pub fn priority_key(priority: Option<&Value>) -> f64 {
    let key = match priority {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_leading_int(s),
        _ => None,
    };
    key.filter(|k| !k.is_nan()).unwrap_or(f64::INFINITY)
}

/// Parses the leading base-10 integer of a string: optional whitespace, an
/// optional sign, then digits. Trailing characters are ignored.
fn parse_leading_int(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    rest[..end].parse::<f64>().ok().map(|n| sign * n)
}

fn base_path(
    value: Option<&Value>,
    location: impl FnOnce() -> String,
) -> PluginResult<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(path)) => Ok(Some(path.clone())),
        Some(_) => Err(PluginError::InvalidBasePath {
            location: location(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn names(ordered: &[OrderedPlugin]) -> Vec<&str> {
        ordered.iter().map(|p| p.name.as_str()).collect()
    }

    fn config(value: Value) -> PluginsConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_priority_order_with_numeric_strings() {
        let plugins = config(json!({
            "a": { "priority": 50 },
            "b": { "priority": "10" },
            "c": {},
            "d": { "priority": 10 },
        }));

        let ordered = order_plugins(&plugins).unwrap();
        assert_eq!(names(&ordered), vec!["b", "d", "a", "c"]);
        assert!(ordered[3].is_unprioritized());
    }

    #[test]
    fn test_unprioritized_keep_source_order() {
        let plugins = config(json!({
            "x": { "priority": "abc" },
            "first": { "priority": -5 },
            "y": { "priority": true },
            "z": {},
        }));

        assert_eq!(names(&order_plugins(&plugins).unwrap()), vec!["first", "x", "y", "z"]);
    }

    #[test]
    fn test_disabled_and_reserved_keys_are_skipped() {
        let plugins = config(json!({
            "require_from_path": "/srv",
            "on": { "enable": true },
            "off": { "enable": false, "priority": 1 },
        }));

        let ordered = order_plugins(&plugins).unwrap();
        assert_eq!(names(&ordered), vec!["on"]);
        assert_eq!(ordered[0].global_require_from_path.as_deref(), Some("/srv"));
    }

    #[test]
    fn test_name_override_and_options() {
        let plugins = config(json!({
            "key": { "name": "renamed", "options": { "level": 2 } },
        }));

        let ordered = order_plugins(&plugins).unwrap();
        assert_eq!(ordered[0].name, "renamed");
        assert_eq!(ordered[0].options, json!({ "level": 2 }));
    }

    #[test]
    fn test_invalid_base_paths() {
        let global = config(json!({ "require_from_path": 42 }));
        let err = order_plugins(&global).unwrap_err();
        assert_eq!(err.to_string(), "plugins 'require_from_path' must be a string");

        let entry = config(json!({ "p": { "require_from_path": ["x"] } }));
        let err = order_plugins(&entry).unwrap_err();
        assert_eq!(err.to_string(), "plugin 'p' 'require_from_path' must be a string");

        let module = config(json!({
            "m": { "module": { "name": "m", "require_from_path": false } }
        }));
        assert!(order_plugins(&module).is_err());
    }

    #[test]
    fn test_source_mapping_is_untouched() {
        let plugins = config(json!({ "b": { "priority": 2 }, "a": { "priority": 1 } }));
        let ordered = order_plugins(&plugins).unwrap();
        assert_eq!(names(&ordered), vec!["a", "b"]);
        let keys: Vec<&str> = plugins.entries.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("10"), Some(10.0));
        assert_eq!(parse_leading_int("10abc"), Some(10.0));
        assert_eq!(parse_leading_int("  -7"), Some(-7.0));
        assert_eq!(parse_leading_int("1.9"), Some(1.0));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(priority_key(Some(&json!(2.5))), 2.5);
        assert_eq!(priority_key(None), f64::INFINITY);
    }
}
