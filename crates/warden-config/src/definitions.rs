//! Static option definitions loaded from TOML.
//!
//! ```toml
//! [[manager]]
//! name = "Discord Enabled"
//! section = "Discord"
//! key = "enabled"
//! type = "bool"
//! default = false
//!
//! [[server]]
//! name = "Server Port"
//! key = "server-port"
//! type = "int"
//! default = 25565
//! ```
//!
//! Each top-level array names a document group. Definitions are validated
//! once at load; a bad table fails startup instead of individual lookups.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::option::{OptionDescriptor, OptionKind};
use crate::registry::OptionRegistry;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOption {
    name: String,
    #[serde(default)]
    section: Option<String>,
    key: String,
    #[serde(default)]
    default: Option<toml::Value>,
    #[serde(default, rename = "type")]
    kind: OptionKind,
    #[serde(default)]
    help: String,
    #[serde(default)]
    options: Option<Vec<toml::Value>>,
}

fn value_to_raw(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(true) => "True".to_string(),
        toml::Value::Boolean(false) => "False".to_string(),
        toml::Value::Array(items) => items.iter().map(value_to_raw).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

impl RawOption {
    fn into_descriptor(self, group: &str) -> Result<OptionDescriptor> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::definitions(format!("{group}: option with empty name")));
        }
        if self.key.trim().is_empty() {
            return Err(ConfigError::definitions(format!(
                "{group}: option {} has an empty key",
                self.name
            )));
        }
        let mut descriptor = OptionDescriptor::new(self.name, self.key, self.kind).with_help(self.help);
        if let Some(section) = self.section {
            descriptor = descriptor.in_section(section);
        }
        if let Some(default) = self.default {
            descriptor = descriptor.with_default(value_to_raw(&default));
        }
        if let Some(options) = self.options {
            descriptor = descriptor.with_allowed(options.iter().map(value_to_raw).collect());
        }
        Ok(descriptor)
    }
}

/// Validated option definitions grouped by document.
#[derive(Debug, Clone, Default)]
pub struct OptionDefinitions {
    groups: HashMap<String, Vec<OptionDescriptor>>,
}

impl OptionDefinitions {
    /// Parses definitions from a TOML string.
    ///
    /// # Errors
    /// Returns an error on malformed TOML, unknown types, empty names/keys,
    /// or a name registered twice within a group.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<RawOption>> =
            toml::from_str(content).map_err(|e| ConfigError::definitions(e.to_string()))?;

        let mut groups = HashMap::with_capacity(raw.len());
        for (group, options) in raw {
            let mut registry = OptionRegistry::new();
            for option in options {
                registry.register(option.into_descriptor(&group)?)?;
            }
            groups.insert(group, registry.iter().cloned().collect());
        }
        Ok(Self { groups })
    }

    /// Loads definitions from a file; a missing file yields no definitions.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no option definitions file");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Descriptors for a document group, in definition order.
    #[must_use]
    pub fn group(&self, name: &str) -> &[OptionDescriptor] {
        self.groups.get(name).map_or(&[], Vec::as_slice)
    }

    /// Adds descriptors for a group programmatically.
    pub fn insert_group(&mut self, name: impl Into<String>, descriptors: Vec<OptionDescriptor>) {
        self.groups.insert(name.into(), descriptors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[manager]]
name = "Discord Enabled"
section = "Discord"
key = "enabled"
type = "bool"
default = true
help = "Send notices to Discord"

[[manager]]
name = "Game Branch"
section = "Game"
key = "branch"
default = "latest"
options = ["latest", "pre-release"]

[[server]]
name = "Server Port"
key = "server-port"
type = "int"
default = 25565
"#;

    #[test]
    fn test_parse_groups() {
        let defs = OptionDefinitions::from_toml_str(SAMPLE).unwrap();
        let manager = defs.group("manager");
        assert_eq!(manager.len(), 2);
        assert_eq!(manager[0].name(), "Discord Enabled");
        assert_eq!(manager[0].section(), Some("Discord"));
        assert_eq!(manager[0].default_raw(), "True");
        assert_eq!(manager[1].allowed().unwrap(), ["latest", "pre-release"]);

        let server = defs.group("server");
        assert_eq!(server[0].kind(), OptionKind::Int);
        assert_eq!(server[0].default_raw(), "25565");
        assert!(defs.group("missing").is_empty());
    }

    #[test]
    fn test_bool_without_default_is_false() {
        let defs = OptionDefinitions::from_toml_str(
            "[[g]]\nname = \"Flag\"\nkey = \"flag\"\ntype = \"boolean\"\n",
        )
        .unwrap();
        assert_eq!(defs.group("g")[0].default_raw(), "False");
    }

    #[test]
    fn test_duplicate_in_group_rejected() {
        let content = "[[g]]\nname = \"A\"\nkey = \"a\"\n[[g]]\nname = \"A\"\nkey = \"b\"\n";
        assert!(matches!(
            OptionDefinitions::from_toml_str(content),
            Err(ConfigError::Conflict(_))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let content = "[[g]]\nname = \"A\"\nkey = \"a\"\ntype = \"matrix\"\n";
        assert!(matches!(
            OptionDefinitions::from_toml_str(content),
            Err(ConfigError::Definitions(_))
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let content = "[[g]]\nname = \"A\"\nkey = \"\"\n";
        assert!(OptionDefinitions::from_toml_str(content).is_err());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let defs = OptionDefinitions::load(dir.path().join("configs.toml")).unwrap();
        assert!(defs.group("manager").is_empty());
    }
}
