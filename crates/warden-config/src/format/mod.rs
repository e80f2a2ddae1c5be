//! On-disk format backends.
//!
//! Every backend offers the same capability set; the concrete backend is
//! chosen once when a document is constructed.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::option::OptionDescriptor;
use crate::ownership;

mod document;
mod flat;
mod sectioned;

pub use document::DocumentFile;
pub use flat::FlatFile;
pub use sectioned::SectionedFile;

/// Capability set shared by all config file formats.
pub trait FormatBackend: Send + Sync + fmt::Debug {
    /// Which format this backend implements.
    fn kind(&self) -> FormatKind;

    /// Returns true if the backing file exists.
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Parses the file into memory, replacing any previous content.
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Renders the in-memory content and writes it to `path`.
    fn save(&self, path: &Path, privileged: bool) -> Result<()>;

    /// Stored string for an option, or `None` if the location is unset.
    fn get_raw(&self, option: &OptionDescriptor) -> Option<String>;

    /// Stores a string for an option in memory.
    fn set_raw(&mut self, option: &OptionDescriptor, raw: &str);

    /// Returns true if the location holds a non-empty value.
    fn has_raw(&self, option: &OptionDescriptor) -> bool;
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Sectioned key-value (`.ini`).
    #[serde(alias = "ini")]
    Sectioned,
    /// Hierarchical document addressed by slash paths (`.json`).
    #[serde(alias = "json")]
    Document,
    /// Flat `key=value` (`.properties`).
    #[serde(alias = "properties")]
    Flat,
}

impl FormatKind {
    /// Builds an empty backend of this kind.
    ///
    /// `spoof_section` only applies to sectioned files: the file has no
    /// header on disk and its keys are read under a synthetic `[group]`.
    #[must_use]
    pub fn backend(self, group: &str, spoof_section: bool) -> Box<dyn FormatBackend> {
        match self {
            Self::Sectioned if spoof_section => Box::new(SectionedFile::spoofed(group)),
            Self::Sectioned => Box::new(SectionedFile::new()),
            Self::Document => Box::new(DocumentFile::new()),
            Self::Flat => Box::new(FlatFile::new()),
        }
    }
}

fn write_file(path: &Path, content: &str, privileged: bool) -> Result<()> {
    ownership::prepare_parent(path, privileged)?;
    std::fs::write(path, content)?;
    ownership::inherit_owner(path, privileged)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "saved config file");
    Ok(())
}
