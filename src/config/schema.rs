//! Static, versioned schema for configuration documents.
//!
//! Validation walks the merged document once and collects *every* problem:
//! missing required keys, type mismatches and out-of-range values are
//! errors; unknown keys are warnings.
use toml::{Table, Value};

use crate::error::ConfigIssue;

/// The only schema version this engine understands.
pub const SCHEMA_VERSION: i64 = 1;

/// Accepted package manager names.
pub const PACKAGE_MANAGERS: &[&str] = &["brew", "apt", "pacman"];

/// Accepted device classes.
pub const DEVICE_CLASSES: &[&str] = &["headless-server", "portable", "compact-desktop"];

/// Expected shape of a value.
#[derive(Debug, Clone, Copy)]
pub enum Kind {
    /// A string.
    Str,
    /// An integer.
    Int,
    /// A boolean.
    Bool,
    /// Any of string, integer, float or boolean.
    Scalar,
    /// A sequence of strings.
    StrList,
    /// A string drawn from a fixed set.
    OneOf(&'static [&'static str]),
    /// A table with known keys.
    Table(&'static [KeySpec]),
    /// A sequence of tables with known keys.
    TableList(&'static [KeySpec]),
    /// A table of arbitrarily named entries, each a table with known keys.
    TableMap(&'static [KeySpec]),
    /// A table with arbitrary contents.
    FreeTable,
}

/// A key the schema knows about.
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    /// Key name.
    pub key: &'static str,
    /// Expected shape.
    pub kind: Kind,
    /// Whether the key must be present when its parent is.
    pub required: bool,
}

const fn required(key: &'static str, kind: Kind) -> KeySpec {
    KeySpec {
        key,
        kind,
        required: true,
    }
}

const fn optional(key: &'static str, kind: Kind) -> KeySpec {
    KeySpec {
        key,
        kind,
        required: false,
    }
}

const NETWORK: &[KeySpec] = &[
    required("dns", Kind::StrList),
    optional("service", Kind::Str),
    optional("search_domains", Kind::StrList),
];

const TIME: &[KeySpec] = &[required("server", Kind::Str)];

const SECURITY: &[KeySpec] = &[
    required("firewall", Kind::Bool),
    optional("stealth", Kind::Bool),
];

const PACKAGES: &[KeySpec] = &[
    required("manager", Kind::OneOf(PACKAGE_MANAGERS)),
    required("install", Kind::StrList),
];

const PREFERENCE: &[KeySpec] = &[
    required("domain", Kind::Str),
    required("key", Kind::Str),
    required("value", Kind::Scalar),
    optional("privileged", Kind::Bool),
];

const PREFERENCES: &[KeySpec] = &[required("defaults", Kind::TableList(PREFERENCE))];

const TEMPLATE_FILE: &[KeySpec] = &[
    required("source", Kind::Str),
    required("destination", Kind::Str),
    optional("privileged", Kind::Bool),
];

const TEMPLATES: &[KeySpec] = &[required("files", Kind::TableList(TEMPLATE_FILE))];

const DEVICE: &[KeySpec] = &[
    required("class", Kind::OneOf(DEVICE_CLASSES)),
    optional("vars", Kind::FreeTable),
];

const MODULE_STEP: &[KeySpec] = &[
    required("description", Kind::Str),
    required("check", Kind::Str),
    required("apply", Kind::Str),
    optional("privileged", Kind::Bool),
];

const MODULE: &[KeySpec] = &[
    optional("depends_on", Kind::StrList),
    required("steps", Kind::TableList(MODULE_STEP)),
];

/// Top-level schema: the version key plus one entry per domain.
pub const ROOT: &[KeySpec] = &[
    required("schema_version", Kind::Int),
    required("devices", Kind::TableMap(DEVICE)),
    optional("network", Kind::Table(NETWORK)),
    optional("time", Kind::Table(TIME)),
    optional("security", Kind::Table(SECURITY)),
    optional("packages", Kind::Table(PACKAGES)),
    optional("preferences", Kind::Table(PREFERENCES)),
    optional("templates", Kind::Table(TEMPLATES)),
    optional("modules", Kind::TableMap(MODULE)),
];

/// Outcome of validating a document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Problems that make the document unusable.
    pub errors: Vec<ConfigIssue>,
    /// Problems worth reporting that do not block the run.
    pub warnings: Vec<ConfigIssue>,
}

impl Validation {
    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ConfigIssue::new(path, message));
    }

    fn mismatch(&mut self, path: &str, expected: &str, value: &Value) {
        self.error(
            path,
            format!("expected {expected}, found {}", value.type_str()),
        );
    }
}

/// Validate a merged document against [`ROOT`].
#[must_use]
pub fn validate(root: &Table) -> Validation {
    let mut v = Validation::default();
    check_table(root, ROOT, "", &mut v);
    if let Some(version) = root.get("schema_version").and_then(Value::as_integer)
        && version != SCHEMA_VERSION
    {
        v.error(
            "schema_version",
            format!("unsupported schema version {version} (expected {SCHEMA_VERSION})"),
        );
    }
    v
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn check_table(table: &Table, specs: &[KeySpec], prefix: &str, v: &mut Validation) {
    for spec in specs {
        let path = join(prefix, spec.key);
        match table.get(spec.key) {
            Some(value) => check_value(value, spec.kind, &path, v),
            None if spec.required => v.error(&path, "missing required key"),
            None => {}
        }
    }
    for key in table.keys() {
        if !specs.iter().any(|s| s.key == key) {
            v.warnings
                .push(ConfigIssue::new(join(prefix, key), "unknown key"));
        }
    }
}

fn check_value(value: &Value, kind: Kind, path: &str, v: &mut Validation) {
    match kind {
        Kind::Str => {
            if !value.is_str() {
                v.mismatch(path, "string", value);
            }
        }
        Kind::Int => {
            if !value.is_integer() {
                v.mismatch(path, "integer", value);
            }
        }
        Kind::Bool => {
            if !value.is_bool() {
                v.mismatch(path, "boolean", value);
            }
        }
        Kind::Scalar => {
            if !(value.is_str() || value.is_integer() || value.is_float() || value.is_bool()) {
                v.mismatch(path, "string, number or boolean", value);
            }
        }
        Kind::StrList => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_str() {
                        v.mismatch(&format!("{path}[{i}]"), "string", item);
                    }
                }
            }
            None => v.mismatch(path, "array of strings", value),
        },
        Kind::OneOf(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => v.error(
                path,
                format!("expected one of {}, found '{s}'", allowed.join(", ")),
            ),
            None => v.mismatch(path, "string", value),
        },
        Kind::Table(specs) => match value.as_table() {
            Some(table) => check_table(table, specs, path, v),
            None => v.mismatch(path, "table", value),
        },
        Kind::TableList(specs) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match item.as_table() {
                        Some(table) => check_table(table, specs, &item_path, v),
                        None => v.mismatch(&item_path, "table", item),
                    }
                }
            }
            None => v.mismatch(path, "array of tables", value),
        },
        Kind::TableMap(specs) => match value.as_table() {
            Some(entries) => {
                for (name, entry) in entries {
                    let entry_path = join(path, name);
                    match entry.as_table() {
                        Some(table) => check_table(table, specs, &entry_path, v),
                        None => v.mismatch(&entry_path, "table", entry),
                    }
                }
            }
            None => v.mismatch(path, "table", value),
        },
        Kind::FreeTable => {
            if !value.is_table() {
                v.mismatch(path, "table", value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const MINIMAL: &str = "schema_version = 1\n[devices.mbp]\nclass = \"portable\"\n";

    fn run(text: &str) -> Validation {
        validate(&text.parse::<Table>().unwrap())
    }

    fn locations(issues: &[ConfigIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.location.as_str()).collect()
    }

    #[test]
    fn minimal_document_is_valid() {
        let v = run(MINIMAL);
        assert!(v.errors.is_empty(), "unexpected errors: {:?}", v.errors);
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn missing_top_level_keys_are_all_reported() {
        let v = run("");
        assert_eq!(locations(&v.errors), vec!["schema_version", "devices"]);
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let v = run("schema_version = 2\n[devices.mbp]\nclass = \"portable\"\n");
        assert_eq!(locations(&v.errors), vec!["schema_version"]);
        assert!(v.errors[0].message.contains("unsupported schema version 2"));
    }

    #[test]
    fn domain_required_keys_are_checked() {
        let v = run(&format!("{MINIMAL}[network]\nservice = \"Wi-Fi\"\n[time]\n"));
        assert_eq!(locations(&v.errors), vec!["network.dns", "time.server"]);
    }

    #[test]
    fn type_mismatches_name_both_types() {
        let v = run(&format!("{MINIMAL}[security]\nfirewall = \"yes\"\n"));
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.errors[0].location, "security.firewall");
        assert_eq!(v.errors[0].message, "expected boolean, found string");
    }

    #[test]
    fn string_list_items_are_checked() {
        let v = run(&format!("{MINIMAL}[network]\ndns = [\"1.1.1.1\", 8]\n"));
        assert_eq!(locations(&v.errors), vec!["network.dns[1]"]);
    }

    #[test]
    fn one_of_rejects_unknown_values() {
        let v = run("schema_version = 1\n[devices.nas]\nclass = \"mainframe\"\n");
        assert_eq!(locations(&v.errors), vec!["devices.nas.class"]);
        assert!(v.errors[0].message.contains("headless-server"));
    }

    #[test]
    fn table_lists_validate_each_item() {
        let v = run(&format!(
            "{MINIMAL}[[templates.files]]\nsource = \"a.tmpl\"\n[[templates.files]]\nsource = \"b\"\ndestination = \"~/b\"\n"
        ));
        assert_eq!(locations(&v.errors), vec!["templates.files[0].destination"]);
    }

    #[test]
    fn user_modules_require_steps() {
        let v = run(&format!("{MINIMAL}[modules.brewfile]\ndepends_on = [\"packages\"]\n"));
        assert_eq!(locations(&v.errors), vec!["modules.brewfile.steps"]);
    }

    #[test]
    fn unknown_keys_are_warnings() {
        let v = run(&format!("{MINIMAL}[network]\ndns = []\nmtu = 1500\n[printers]\n"));
        assert!(v.errors.is_empty());
        assert_eq!(locations(&v.warnings), vec!["network.mtu", "printers"]);
    }

    #[test]
    fn free_tables_accept_anything() {
        let v = run(
            "schema_version = 1\n[devices.mbp]\nclass = \"portable\"\n[devices.mbp.vars]\nfont = \"Iosevka\"\nsize = 14\ntoken = { env = \"TOKEN\" }\n",
        );
        assert!(v.errors.is_empty());
        assert!(v.warnings.is_empty());
    }
}
