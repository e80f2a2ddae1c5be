//! A single config file bound to a format backend.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::format::{FormatBackend, FormatKind};
use crate::option::{OptionDescriptor, OptionValue};
use crate::registry::OptionRegistry;

/// One on-disk config file and the options it holds.
///
/// Content lives in memory between [`load`](Self::load) and
/// [`save`](Self::save); nothing is written until `save` is called.
#[derive(Debug)]
pub struct ConfigDocument {
    group: String,
    path: PathBuf,
    backend: Box<dyn FormatBackend>,
    registry: OptionRegistry,
    privileged: bool,
}

impl ConfigDocument {
    /// Creates a document for `path` using the given format.
    #[must_use]
    pub fn new(group: impl Into<String>, path: impl Into<PathBuf>, format: FormatKind) -> Self {
        let group = group.into();
        Self {
            backend: format.backend(&group, false),
            group,
            path: path.into(),
            registry: OptionRegistry::new(),
            privileged: false,
        }
    }

    /// Sectioned document whose file carries no header on disk.
    #[must_use]
    pub fn spoofed(group: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let group = group.into();
        Self {
            backend: FormatKind::Sectioned.backend(&group, true),
            group,
            path: path.into(),
            registry: OptionRegistry::new(),
            privileged: false,
        }
    }

    /// Saves apply inherited ownership when `privileged` is set.
    #[must_use]
    pub const fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Registers every descriptor, failing on the first duplicate.
    pub fn with_options(mut self, descriptors: impl IntoIterator<Item = OptionDescriptor>) -> Result<Self> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(self)
    }

    /// Registers one descriptor.
    pub fn register(&mut self, descriptor: OptionDescriptor) -> Result<()> {
        self.registry.register(descriptor)
    }

    /// Group name of this document.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File format.
    #[must_use]
    pub fn format(&self) -> FormatKind {
        self.backend.kind()
    }

    /// Registered descriptors.
    #[must_use]
    pub const fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    /// Returns true if `name` is registered here.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Returns true if the backing file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.backend.exists(&self.path)
    }

    /// Reads the backing file into memory.
    pub fn load(&mut self) -> Result<()> {
        self.backend.load(&self.path)?;
        tracing::debug!(group = %self.group, path = %self.path.display(), "loaded config document");
        Ok(())
    }

    /// Writes the in-memory content to the backing file.
    pub fn save(&self) -> Result<()> {
        self.backend.save(&self.path, self.privileged)
    }

    fn descriptor(&self, name: &str) -> Result<&OptionDescriptor> {
        self.registry
            .get(name)
            .ok_or_else(|| ConfigError::not_found(name))
    }

    /// Stored string for `name`, falling back to its default.
    pub fn get_raw(&self, name: &str) -> Result<String> {
        let descriptor = self.descriptor(name)?;
        Ok(self
            .backend
            .get_raw(descriptor)
            .unwrap_or_else(|| descriptor.default_raw().to_string()))
    }

    /// Typed value for `name`, falling back to its default.
    pub fn get(&self, name: &str) -> Result<OptionValue> {
        let descriptor = self.descriptor(name)?;
        let raw = self.get_raw(name)?;
        descriptor.decode(&raw)
    }

    /// Sets `name` in memory. Call [`save`](Self::save) to persist.
    pub fn set(&mut self, name: &str, value: &OptionValue) -> Result<()> {
        let descriptor = self.descriptor(name)?;
        let raw = descriptor.encode(value)?;
        let descriptor = descriptor.clone();
        self.set_raw(&descriptor, &raw);
        Ok(())
    }

    pub(crate) fn set_raw(&mut self, descriptor: &OptionDescriptor, raw: &str) {
        self.backend.set_raw(descriptor, raw);
    }

    /// Returns true if the file holds a non-empty value for `name`.
    #[must_use]
    pub fn has_value(&self, name: &str) -> bool {
        self.registry
            .get(name)
            .is_some_and(|descriptor| self.backend.has_raw(descriptor))
    }
}
