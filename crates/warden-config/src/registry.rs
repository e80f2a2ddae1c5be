//! Registration table of option descriptors for one document.

use std::collections::HashMap;

use crate::error::{ConfigError, Result};
use crate::option::OptionDescriptor;

/// Ordered set of descriptors with unique names.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    descriptors: Vec<OptionDescriptor>,
    by_name: HashMap<String, usize>,
}

impl OptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor.
    ///
    /// # Errors
    /// Returns [`ConfigError::Conflict`] if the name is already registered.
    pub fn register(&mut self, descriptor: OptionDescriptor) -> Result<()> {
        if self.by_name.contains_key(descriptor.name()) {
            return Err(ConfigError::conflict(format!(
                "option {} registered twice",
                descriptor.name()
            )));
        }
        self.by_name
            .insert(descriptor.name().to_string(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OptionDescriptor> {
        self.by_name.get(name).map(|&idx| &self.descriptors[idx])
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterates descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.descriptors.iter()
    }

    /// Number of registered options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option::OptionKind;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = OptionRegistry::new();
        registry
            .register(OptionDescriptor::new("Server Port", "server-port", OptionKind::Int))
            .unwrap();
        assert!(registry.contains("Server Port"));
        assert_eq!(registry.get("Server Port").unwrap().key(), "server-port");
        assert!(registry.get("Query Port").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = OptionRegistry::new();
        registry
            .register(OptionDescriptor::new("Level Name", "level-name", OptionKind::Str))
            .unwrap();
        let err = registry
            .register(OptionDescriptor::new("Level Name", "world", OptionKind::Str))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Conflict(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_preserves_order() {
        let mut registry = OptionRegistry::new();
        for name in ["b", "a", "c"] {
            registry
                .register(OptionDescriptor::new(name, name, OptionKind::Str))
                .unwrap();
        }
        let names: Vec<_> = registry.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }
}
