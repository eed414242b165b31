//! Declarative configuration: loading, merging, schema validation and
//! device profile selection.
pub mod loader;
pub mod profiles;
pub mod schema;

pub use loader::load;
pub use profiles::{DeviceClass, DeviceProfile};

use toml::{Table, Value};

use crate::error::ConfigIssue;

/// Merged, validated configuration for one run.
///
/// Top-level tables are *domains* (`network`, `security`, `devices`, …).
/// The document exposes read-only accessors only; it is never mutated after
/// [`load`] returns it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationDocument {
    root: Table,
    warnings: Vec<ConfigIssue>,
}

impl ConfigurationDocument {
    /// Wrap an already merged table without validation.
    #[must_use]
    pub const fn from_table(root: Table) -> Self {
        Self {
            root,
            warnings: Vec::new(),
        }
    }

    pub(crate) const fn with_warnings(root: Table, warnings: Vec<ConfigIssue>) -> Self {
        Self { root, warnings }
    }

    /// Non-fatal problems found during validation (unknown keys, …).
    #[must_use]
    pub fn warnings(&self) -> &[ConfigIssue] {
        &self.warnings
    }

    /// The underlying merged table.
    #[must_use]
    pub const fn as_table(&self) -> &Table {
        &self.root
    }

    /// Look up a value by dotted path (e.g. `"network.dns"`).
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }

    /// A top-level domain table, if configured.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&Table> {
        self.root.get(name).and_then(Value::as_table)
    }

    /// Whether a top-level domain is configured.
    #[must_use]
    pub fn has_domain(&self, name: &str) -> bool {
        self.domain(name).is_some()
    }

    /// String value at `path`.
    #[must_use]
    pub fn str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Boolean value at `path`.
    #[must_use]
    pub fn bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// String sequence at `path`; empty when absent. Non-string items are ignored.
    #[must_use]
    pub fn strings(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sequence of tables at `path`; empty when absent.
    #[must_use]
    pub fn tables(&self, path: &str) -> Vec<&Table> {
        self.get(path)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_table).collect())
            .unwrap_or_default()
    }
}

/// Merge `overlay` into `base`, last writer wins per leaf key.
///
/// Tables merge recursively; every other value, sequences included, is
/// replaced wholesale.
pub fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(Value::Table(existing)) = base.get_mut(&key) {
            merge(existing, incoming);
            continue;
        }
        base.insert(key, Value::Table(incoming));
    }
}
