//! Ordered set of config documents with typed, format-agnostic option access.

use std::path::Path;

use serde::Serialize;

use crate::document::ConfigDocument;
use crate::error::{ConfigError, Result};
use crate::option::{OptionDescriptor, OptionKind, OptionValue};

/// A persisted option change, handed to side-effect hooks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionChange {
    /// Option name.
    pub option: String,
    /// Value before the write.
    pub previous: OptionValue,
    /// Value after the write.
    pub new: OptionValue,
}

/// Listing entry for one registered option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionInfo {
    /// Option name.
    pub option: String,
    /// Typed default.
    pub default: OptionValue,
    /// Current typed value.
    pub value: OptionValue,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: OptionKind,
    /// Help text.
    pub help: String,
    /// Allowed values, if restricted.
    pub options: Option<Vec<String>>,
}

/// Typed option registry over one or more documents.
///
/// Lookup walks documents in the order they were added and uses the first
/// one that registers the name. A name may be registered by only one
/// document of a store.
#[derive(Debug)]
pub struct ConfigStore {
    documents: Vec<ConfigDocument>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self { documents: Vec::new() }
    }

    /// Adds a document.
    ///
    /// # Errors
    /// Returns [`ConfigError::Conflict`] if the document registers a name
    /// that an earlier document already holds.
    pub fn add_document(&mut self, document: ConfigDocument) -> Result<()> {
        if let Some(dup) = document
            .registry()
            .iter()
            .find(|d| self.locate(d.name()).is_some())
        {
            return Err(ConfigError::conflict(format!(
                "option {} is registered by more than one document",
                dup.name()
            )));
        }
        self.documents.push(document);
        Ok(())
    }

    /// Builder form of [`add_document`](Self::add_document).
    pub fn with_document(mut self, document: ConfigDocument) -> Result<Self> {
        self.add_document(document)?;
        Ok(self)
    }

    /// Registers a descriptor on the document named `group`.
    pub fn register(&mut self, group: &str, descriptor: OptionDescriptor) -> Result<()> {
        if self.locate(descriptor.name()).is_some() {
            return Err(ConfigError::conflict(format!(
                "option {} registered twice",
                descriptor.name()
            )));
        }
        let document = self
            .documents
            .iter_mut()
            .find(|doc| doc.group() == group)
            .ok_or_else(|| ConfigError::not_found(format!("document {group}")))?;
        document.register(descriptor)
    }

    /// Bound documents in lookup order.
    #[must_use]
    pub fn documents(&self) -> &[ConfigDocument] {
        &self.documents
    }

    /// Paths of every bound document.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.documents.iter().map(ConfigDocument::path)
    }

    fn locate(&self, name: &str) -> Option<usize> {
        self.documents.iter().position(|doc| doc.contains(name))
    }

    /// Descriptor for `name`, if registered.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&OptionDescriptor> {
        self.locate(name)
            .and_then(|idx| self.documents[idx].registry().get(name))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.locate(name).is_some()
    }

    /// Typed value of `name`.
    pub fn try_get(&self, name: &str) -> Result<OptionValue> {
        let idx = self.locate(name).ok_or_else(|| ConfigError::not_found(name))?;
        self.documents[idx].get(name)
    }

    /// Typed value of `name`, or [`OptionValue::Empty`] with a diagnostic if
    /// the option is unknown or its stored value cannot be parsed.
    #[must_use]
    pub fn get(&self, name: &str) -> OptionValue {
        match self.try_get(name) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(option = %name, error = %e, "option lookup failed");
                OptionValue::Empty
            }
        }
    }

    /// Sets `name` and persists its document.
    ///
    /// Returns `Ok(None)` without writing when the stored value already
    /// equals `value`.
    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<Option<OptionChange>> {
        let value = value.into();
        let idx = self.locate(name).ok_or_else(|| ConfigError::not_found(name))?;
        let document = &mut self.documents[idx];
        let descriptor = document
            .registry()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::not_found(name))?;

        let encoded = descriptor.encode(&value)?;
        let current_raw = document.get_raw(name)?;
        let current = descriptor.decode(&current_raw).ok();
        let current_encoded = current.as_ref().and_then(|v| descriptor.encode(v).ok());
        if current_encoded.as_deref() == Some(encoded.as_str()) {
            tracing::debug!(option = %name, "value unchanged, skipping write");
            return Ok(None);
        }

        document.set_raw(&descriptor, &encoded);
        document.save()?;
        let new = descriptor.decode(&encoded)?;
        tracing::info!(option = %name, value = %new, "option updated");
        Ok(Some(OptionChange {
            option: name.to_string(),
            previous: current.unwrap_or_else(|| OptionValue::Str(current_raw)),
            new,
        }))
    }

    /// Sets `name` from user-supplied text.
    pub fn set_str(&mut self, name: &str, value: &str) -> Result<Option<OptionChange>> {
        self.set(name, OptionValue::Str(value.to_string()))
    }

    /// Returns true if a non-empty value is stored for `name`.
    #[must_use]
    pub fn has_value(&self, name: &str) -> bool {
        self.locate(name)
            .is_some_and(|idx| self.documents[idx].has_value(name))
    }

    /// Typed default of `name`, or [`OptionValue::Empty`] if unknown.
    #[must_use]
    pub fn default_value(&self, name: &str) -> OptionValue {
        self.descriptor(name)
            .map_or(OptionValue::Empty, OptionDescriptor::default_value)
    }

    /// Declared type of `name`.
    #[must_use]
    pub fn declared_type(&self, name: &str) -> Option<OptionKind> {
        self.descriptor(name).map(OptionDescriptor::kind)
    }

    /// Enumerated values allowed for `name`, if restricted.
    #[must_use]
    pub fn allowed_values(&self, name: &str) -> Option<&[String]> {
        self.descriptor(name).and_then(OptionDescriptor::allowed)
    }

    /// Help text for `name`.
    #[must_use]
    pub fn help(&self, name: &str) -> Option<&str> {
        self.descriptor(name).map(OptionDescriptor::help)
    }

    /// Every registered option name, sorted.
    #[must_use]
    pub fn options(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .documents
            .iter()
            .flat_map(|doc| doc.registry().iter().map(OptionDescriptor::name))
            .collect();
        names.sort_unstable();
        names
    }

    /// Describes every registered option in lookup order.
    #[must_use]
    pub fn describe(&self) -> Vec<OptionInfo> {
        self.documents
            .iter()
            .flat_map(|doc| doc.registry().iter())
            .map(|descriptor| OptionInfo {
                option: descriptor.name().to_string(),
                default: descriptor.default_value(),
                value: self.get(descriptor.name()),
                kind: descriptor.kind(),
                help: descriptor.help().to_string(),
                options: descriptor.allowed().map(<[String]>::to_vec),
            })
            .collect()
    }

    /// Writes the default of `name` if no value is stored yet.
    pub fn ensure_set(&mut self, name: &str) -> Result<Option<OptionChange>> {
        if self.has_value(name) {
            return Ok(None);
        }
        let idx = self.locate(name).ok_or_else(|| ConfigError::not_found(name))?;
        let document = &mut self.documents[idx];
        let descriptor = document
            .registry()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::not_found(name))?;
        document.set_raw(&descriptor, descriptor.default_raw());
        document.save()?;
        Ok(Some(OptionChange {
            option: name.to_string(),
            previous: OptionValue::Empty,
            new: descriptor.default_value(),
        }))
    }

    /// Loads every document whose file exists.
    ///
    /// Returns true if at least one file was loaded.
    pub fn load(&mut self) -> Result<bool> {
        let mut loaded = false;
        for document in &mut self.documents {
            if document.exists() {
                document.load()?;
                loaded = true;
            }
        }
        Ok(loaded)
    }

    /// Saves every document.
    pub fn save(&self) -> Result<()> {
        self.documents.iter().try_for_each(ConfigDocument::save)
    }

    /// Returns true if any bound file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.documents.iter().any(ConfigDocument::exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatKind;

    fn store(dir: &Path) -> ConfigStore {
        let manager = ConfigDocument::new("manager", dir.join("manager.ini"), FormatKind::Sectioned)
            .with_options([
                OptionDescriptor::new("Discord Enabled", "enabled", OptionKind::Bool).in_section("Discord"),
                OptionDescriptor::new("Shutdown Warning", "stop_delayed", OptionKind::Str)
                    .in_section("Messages")
                    .with_default("Server will stop in {time} minutes."),
            ])
            .unwrap();
        let server = ConfigDocument::new("server", dir.join("server.properties"), FormatKind::Flat)
            .with_options([
                OptionDescriptor::new("Server Port", "server-port", OptionKind::Int).with_default("25565"),
                OptionDescriptor::new("Level Type", "level-type", OptionKind::Str)
                    .with_default("normal")
                    .with_allowed(vec!["normal".into(), "flat".into()])
                    .with_help("World generator"),
                OptionDescriptor::new("Motd", "motd", OptionKind::Str),
            ])
            .unwrap();
        ConfigStore::new()
            .with_document(manager)
            .unwrap()
            .with_document(server)
            .unwrap()
    }

    #[test]
    fn test_get_unknown_returns_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.get("Nope"), OptionValue::Empty);
        assert!(store.try_get("Nope").unwrap_err().is_not_found());
        assert!(!store.has_value("Nope"));
    }

    #[test]
    fn test_metadata_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.declared_type("Server Port"), Some(OptionKind::Int));
        assert_eq!(store.default_value("Discord Enabled"), OptionValue::Bool(false));
        assert_eq!(store.allowed_values("Level Type").unwrap(), ["normal", "flat"]);
        assert_eq!(store.help("Level Type"), Some("World generator"));
        assert_eq!(
            store.options(),
            ["Discord Enabled", "Level Type", "Motd", "Server Port", "Shutdown Warning"]
        );
    }

    #[test]
    fn test_set_persists_and_reports_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        let change = store.set_str("Server Port", "25570").unwrap().unwrap();
        assert_eq!(change.previous, OptionValue::Int(25565));
        assert_eq!(change.new, OptionValue::Int(25570));
        let content = std::fs::read_to_string(dir.path().join("server.properties")).unwrap();
        assert_eq!(content, "server-port=25570\n");
        assert_eq!(store.get("Server Port"), OptionValue::Int(25570));
    }

    #[test]
    fn test_noop_set_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        assert!(store.set("Server Port", 25565_i64).unwrap().is_none());
        assert!(store.set_str("Server Port", " 25565").unwrap().is_none());
        assert!(!dir.path().join("server.properties").exists());

        store.set("Discord Enabled", true).unwrap().unwrap();
        let path = dir.path().join("manager.ini");
        std::fs::remove_file(&path).unwrap();
        assert!(store.set_str("Discord Enabled", "yes").unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_set_invalid_value_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        assert!(matches!(
            store.set_str("Server Port", "many"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(!dir.path().join("server.properties").exists());
    }

    #[test]
    fn test_duplicate_across_documents_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        let other = ConfigDocument::new("other", dir.path().join("other.json"), FormatKind::Document)
            .with_options([OptionDescriptor::new("Server Port", "/port", OptionKind::Int)])
            .unwrap();
        assert!(matches!(store.add_document(other), Err(ConfigError::Conflict(_))));
        assert!(matches!(
            store.register("manager", OptionDescriptor::new("Motd", "motd", OptionKind::Str)),
            Err(ConfigError::Conflict(_))
        ));
    }

    #[test]
    fn test_ensure_set_writes_default_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        let change = store.ensure_set("Shutdown Warning").unwrap().unwrap();
        assert_eq!(change.new, OptionValue::Str("Server will stop in {time} minutes.".into()));
        assert!(store.has_value("Shutdown Warning"));
        assert!(store.ensure_set("Shutdown Warning").unwrap().is_none());
    }

    #[test]
    fn test_describe_lists_values_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        store.set_str("Motd", "Welcome").unwrap();
        let info = store.describe();
        let names: Vec<&str> = info.iter().map(|i| i.option.as_str()).collect();
        assert_eq!(
            names,
            ["Discord Enabled", "Shutdown Warning", "Server Port", "Level Type", "Motd"]
        );
        let motd = info.iter().find(|i| i.option == "Motd").unwrap();
        assert_eq!(motd.value, OptionValue::Str("Welcome".into()));
        let json = serde_json::to_value(&info[3]).unwrap();
        assert_eq!(json["type"], "str");
        assert_eq!(json["options"][1], "flat");
    }

    #[test]
    fn test_load_reports_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path());
        assert!(!store.exists());
        assert!(!store.load().unwrap());

        std::fs::write(dir.path().join("server.properties"), "#c\nmotd=Hi\\: there\n").unwrap();
        assert!(store.load().unwrap());
        assert_eq!(store.get("Motd"), OptionValue::Str("Hi: there".into()));
        assert!(store.has_value("Motd"));
    }
}
