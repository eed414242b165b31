//! TOML configuration document loading and merging.
use std::path::{Path, PathBuf};

use toml::Table;

use super::{ConfigurationDocument, merge, schema};
use crate::error::{ConfigError, ConfigIssue};

/// Load, merge and validate configuration documents.
///
/// Documents are merged in the given order with the last writer winning per
/// leaf key (see [`merge`]). Every unreadable or unparsable document and
/// every schema violation is collected into a single
/// [`ConfigError::Invalid`] rather than stopping at the first problem.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] listing all problems found.
pub fn load(paths: &[PathBuf]) -> Result<ConfigurationDocument, ConfigError> {
    let mut issues = Vec::new();
    let mut merged = Table::new();

    if paths.is_empty() {
        issues.push(ConfigIssue::new(
            "<config>",
            "no configuration documents given",
        ));
    }

    for path in paths {
        match read_document(path) {
            Ok(table) => merge(&mut merged, table),
            Err(issue) => issues.push(issue),
        }
    }

    // Schema errors on a partially merged document would only be noise.
    if !issues.is_empty() {
        return Err(ConfigError::Invalid(issues));
    }

    let validation = schema::validate(&merged);
    if !validation.errors.is_empty() {
        return Err(ConfigError::Invalid(validation.errors));
    }

    Ok(ConfigurationDocument::with_warnings(
        merged,
        validation.warnings,
    ))
}

fn read_document(path: &Path) -> Result<Table, ConfigIssue> {
    let location = path.display().to_string();
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigIssue::new(&location, format!("cannot read file: {e}")))?;
    content
        .parse::<Table>()
        .map_err(|e| ConfigIssue::new(&location, format!("invalid TOML: {}", e.message())))
}
