use std::collections::BTreeMap;

use super::Module;
use crate::error::RegistryError;

/// All modules known to a run, keyed by id.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the id is already taken.
    pub fn register(&mut self, module: Module) -> Result<(), RegistryError> {
        if self.modules.contains_key(&module.id) {
            return Err(RegistryError::Duplicate(module.id));
        }
        self.modules.insert(module.id.clone(), module);
        Ok(())
    }

    /// Find a module by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown ids.
    pub fn lookup(&self, id: &str) -> Result<&Module, RegistryError> {
        self.modules
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Registered modules in ascending id order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
