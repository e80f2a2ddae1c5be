// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # warden-config
//!
//! Typed configuration options over incompatible on-disk formats.
//!
//! - [`OptionDescriptor`] / [`OptionValue`] with exact storage conversion
//! - [`FormatBackend`] implementations for sectioned, document and flat files
//! - [`ConfigDocument`] binding one file to one backend
//! - [`ConfigStore`] for first-match lookup across documents
//! - [`OptionDefinitions`] loaded once from a TOML table
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_config::{ConfigDocument, ConfigStore, FormatKind, OptionDescriptor, OptionKind};
//!
//! let doc = ConfigDocument::new("server", "/srv/game/server.properties", FormatKind::Flat)
//!     .with_options([OptionDescriptor::new("Server Port", "server-port", OptionKind::Int)])?;
//! let mut store = ConfigStore::new().with_document(doc)?;
//! store.load()?;
//! if let Some(change) = store.set("Server Port", 25570_i64)? {
//!     println!("{} -> {}", change.previous, change.new);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod definitions;
pub mod document;
pub mod error;
pub mod format;
pub mod option;
pub mod ownership;
pub mod registry;
pub mod store;

pub use definitions::OptionDefinitions;
pub use document::ConfigDocument;
pub use error::{ConfigError, Result};
pub use format::{DocumentFile, FlatFile, FormatBackend, FormatKind, SectionedFile};
pub use option::{OptionDescriptor, OptionKind, OptionValue, from_storage, is_truthy, to_storage};
pub use ownership::Owner;
pub use registry::OptionRegistry;
pub use store::{ConfigStore, OptionChange, OptionInfo};
