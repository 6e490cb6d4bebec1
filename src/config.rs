//! Node attributes - the per-run configuration snapshot
//!
//! Attributes are a tree of key paths (`openstack.dashboard.server_hostname`)
//! assembled once per run from three layers, lowest precedence first:
//!
//! 1. recipe defaults
//! 2. the attributes file (`~/.config/convergent/attributes.toml` or `--attributes`)
//! 3. `--set key.path=value` overrides
//!
//! After [`NodeAttributes::resolve`] the snapshot is read-only.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::sys;

/// Get the config directory path (~/.config/convergent)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("convergent"))
}

/// Default attributes file
pub fn default_attributes_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("attributes.toml"))
}

/// Default directory holding files copied verbatim (certificates, keys)
pub fn default_files_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("files"))
}

/// Expand `~` and environment variables in a user-supplied path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Could not expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("invalid override '{0}': expected key.path=value")]
    InvalidOverride(String),

    #[error("invalid attribute path '{0}'")]
    InvalidPath(String),

    #[error("attribute '{path}' cannot be set below non-table value '{parent}'")]
    NotATable { path: String, parent: String },

    #[error("attribute '{0}' is not set")]
    Missing(String),

    #[error("attribute '{path}' must be {expected}")]
    WrongType { path: String, expected: &'static str },
}

/// Immutable key-path attribute tree for one run
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttributes {
    root: Value,
}

impl NodeAttributes {
    /// Snapshot from an already assembled tree
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Assemble attributes from defaults, an attributes file, and overrides
    ///
    /// An explicit `file` must exist; without one the default path is used
    /// only when present. `fqdn` falls back to the host name.
    pub fn resolve(defaults: Value, file: Option<&Path>, overrides: &[String]) -> Result<Self> {
        let mut root = defaults;
        if !root.is_object() {
            root = Value::Object(Map::new());
        }

        if root.get("fqdn").is_none_or(Value::is_null) {
            let fqdn = sys::hostname().unwrap_or_else(|| "localhost".to_string());
            log::debug!("fqdn defaulted to {fqdn}");
            set_path(&mut root, "fqdn", Value::String(fqdn))?;
        }

        let file = match file {
            Some(path) => Some(expand_path(path)?),
            None => default_attributes_path().ok().filter(|p| p.exists()),
        };
        if let Some(path) = file {
            let layer = load_file(&path)?;
            merge(&mut root, layer);
            log::debug!("Loaded attributes from {}", path.display());
        }

        for raw in overrides {
            let (path, value) = parse_override(raw)?;
            log::debug!("attribute override {path} = {value}");
            set_path(&mut root, &path, value)?;
        }

        Ok(Self::from_value(root))
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.root, |node, key| node.get(key))
            .filter(|v| !v.is_null())
    }

    pub fn str(&self, path: &str) -> Result<&str, AttributeError> {
        match self.get(path) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(AttributeError::WrongType {
                path: path.to_string(),
                expected: "a string",
            }),
            None => Err(AttributeError::Missing(path.to_string())),
        }
    }

    /// String attribute, `None` when unset
    pub fn opt_str(&self, path: &str) -> Result<Option<&str>, AttributeError> {
        match self.get(path) {
            None => Ok(None),
            Some(_) => self.str(path).map(Some),
        }
    }

    pub fn bool(&self, path: &str) -> Result<bool, AttributeError> {
        match self.get(path) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(AttributeError::WrongType {
                path: path.to_string(),
                expected: "a boolean",
            }),
            None => Err(AttributeError::Missing(path.to_string())),
        }
    }

    pub fn string_list(&self, path: &str) -> Result<Vec<String>, AttributeError> {
        let wrong = || AttributeError::WrongType {
            path: path.to_string(),
            expected: "a list of strings",
        };
        match self.get(path) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(wrong))
                .collect(),
            Some(_) => Err(wrong()),
            None => Err(AttributeError::Missing(path.to_string())),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

fn load_file(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read attributes file: {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Invalid attributes file: {}", path.display()))?;
    serde_json::to_value(table).context("Attributes file is not representable as JSON")
}

/// Deep-merge `layer` into `base`; tables merge, everything else replaces
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|seg| {
            !seg.is_empty()
                && seg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), AttributeError> {
    if !valid_path(path) {
        return Err(AttributeError::InvalidPath(path.to_string()));
    }

    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| AttributeError::InvalidPath(path.to_string()))?;

    let mut node = root;
    for (depth, key) in parents.iter().enumerate() {
        let Value::Object(map) = node else {
            return Err(AttributeError::NotATable {
                path: path.to_string(),
                parent: segments[..depth].join("."),
            });
        };
        let child = map
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if child.is_null() {
            *child = Value::Object(Map::new());
        }
        node = child;
    }

    match node {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        _ => Err(AttributeError::NotATable {
            path: path.to_string(),
            parent: parents.join("."),
        }),
    }
}

/// Parse `key.path=value`; the value is read as a TOML scalar, else a string
fn parse_override(raw: &str) -> Result<(String, Value), AttributeError> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| AttributeError::InvalidOverride(raw.to_string()))?;
    let path = path.trim();
    if !valid_path(path) {
        return Err(AttributeError::InvalidPath(path.to_string()));
    }

    let value = value.trim();
    let parsed = toml::from_str::<toml::Table>(&format!("value = {value}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or_else(|| Value::String(value.to_string()));

    Ok((path.to_string(), parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn defaults() -> Value {
        json!({
            "fqdn": "node1.example.com",
            "openstack": {
                "dashboard": { "server_hostname": null, "use_ssl": true },
                "db": { "dashboard": { "db_type": "mysql" } }
            }
        })
    }

    #[test]
    fn test_override_beats_defaults() {
        let attrs = NodeAttributes::resolve(
            defaults(),
            None,
            &["openstack.db.dashboard.db_type=db2".to_string()],
        )
        .unwrap();
        assert_eq!(attrs.str("openstack.db.dashboard.db_type").unwrap(), "db2");
    }

    #[test]
    fn test_override_values_are_typed() {
        let attrs = NodeAttributes::resolve(
            defaults(),
            None,
            &[
                "openstack.dashboard.use_ssl=false".to_string(),
                "openstack.dashboard.https_port=8443".to_string(),
                "openstack.dashboard.webroot=/horizon".to_string(),
            ],
        )
        .unwrap();
        assert!(!attrs.bool("openstack.dashboard.use_ssl").unwrap());
        assert_eq!(attrs.get("openstack.dashboard.https_port"), Some(&json!(8443)));
        assert_eq!(attrs.str("openstack.dashboard.webroot").unwrap(), "/horizon");
    }

    #[test]
    fn test_null_reads_as_missing() {
        let attrs = NodeAttributes::resolve(defaults(), None, &[]).unwrap();
        assert!(attrs.get("openstack.dashboard.server_hostname").is_none());
        assert_eq!(attrs.opt_str("openstack.dashboard.server_hostname").unwrap(), None);
        assert!(matches!(
            attrs.str("openstack.dashboard.server_hostname"),
            Err(AttributeError::Missing(_))
        ));
    }

    #[test]
    fn test_file_layer_between_defaults_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[openstack.dashboard]\nserver_hostname = \"from-file\"\nwebroot = \"/dash\""
        )
        .unwrap();

        let attrs = NodeAttributes::resolve(
            defaults(),
            Some(file.path()),
            &["openstack.dashboard.webroot=/override".to_string()],
        )
        .unwrap();
        assert_eq!(
            attrs.str("openstack.dashboard.server_hostname").unwrap(),
            "from-file"
        );
        assert_eq!(attrs.str("openstack.dashboard.webroot").unwrap(), "/override");
        // Untouched defaults survive the merge
        assert!(attrs.bool("openstack.dashboard.use_ssl").unwrap());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(NodeAttributes::resolve(defaults(), Some(&missing), &[]).is_err());
    }

    #[test]
    fn test_fqdn_filled_when_absent() {
        let attrs = NodeAttributes::resolve(json!({}), None, &[]).unwrap();
        assert!(!attrs.str("fqdn").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_overrides() {
        assert!(matches!(
            parse_override("no-equals-sign"),
            Err(AttributeError::InvalidOverride(_))
        ));
        assert!(matches!(
            parse_override("bad..path=1"),
            Err(AttributeError::InvalidPath(_))
        ));

        let mut root = json!({ "fqdn": "host" });
        assert!(matches!(
            set_path(&mut root, "fqdn.short", json!("h")),
            Err(AttributeError::NotATable { .. })
        ));
    }

    #[test]
    fn test_unquoted_text_falls_back_to_string() {
        let (_, value) = parse_override("openstack.dashboard.server_hostname=spec-test-host").unwrap();
        assert_eq!(value, json!("spec-test-host"));
    }

    #[test]
    fn test_string_list() {
        let attrs = NodeAttributes::from_value(json!({ "pkgs": ["a", "b"], "bad": [1] }));
        assert_eq!(attrs.string_list("pkgs").unwrap(), vec!["a", "b"]);
        assert!(attrs.string_list("bad").is_err());
    }
}
