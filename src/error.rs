//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`],
//! [`PlanError`]) while command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ProvisionError
//! ├── Config(ConfigError)     - loading, schema validation, device selection
//! ├── Registry(RegistryError) - duplicate or unknown module ids
//! ├── Plan(PlanError)         - cycles and dangling dependencies
//! ├── Template(TemplateError) - unresolved variables, malformed templates
//! └── Exec(ExecError)         - external command failures and timeouts
//! ```
//!
//! Everything except [`TemplateError`] and [`ExecError`] is a hard failure:
//! it is raised before any step executes. The latter two only ever fail the
//! step that triggered them.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Configuration-related error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Module registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Execution planning error.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// External command error.
    #[error("Command error: {0}")]
    Exec(#[from] ExecError),
}

/// A single problem found while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Where the problem is (file path or dotted key path).
    pub location: String,
    /// Human-readable description.
    pub message: String,
}

impl ConfigIssue {
    /// Create a new issue.
    #[must_use]
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that arise from configuration loading and device selection.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more documents could not be read, parsed or validated.
    ///
    /// Every problem found across all documents is listed.
    #[error("{} configuration problem(s):\n{}", .0.len(), format_issues(.0))]
    Invalid(Vec<ConfigIssue>),

    /// The requested device is not defined under `[devices]`.
    #[error("unknown device '{name}' (available: {available})")]
    UnknownDevice {
        /// Requested device identifier.
        name: String,
        /// Comma-separated list of defined devices.
        available: String,
    },

    /// A device variable points at an environment variable that is not set.
    #[error("device variable '{variable}' requires environment variable {env} which is not set")]
    MissingSecret {
        /// Name of the device variable.
        variable: String,
        /// Name of the environment variable.
        env: String,
    },

    /// The configuration root directory could not be determined.
    #[error("cannot determine configuration root; use --root or set PROVISION_ROOT")]
    RootNotFound,
}

impl ConfigError {
    /// Issues carried by an [`ConfigError::Invalid`] error, empty otherwise.
    #[must_use]
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            Self::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// Errors raised by the module registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two modules were registered with the same id.
    #[error("module '{0}' is already registered")]
    Duplicate(String),

    /// No module is registered under the requested id.
    #[error("module '{0}' not found")]
    NotFound(String),
}

/// Errors raised while computing the execution plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The dependency graph contains a cycle; the payload is the full path.
    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    /// A module depends on an id that is not registered.
    #[error("module '{module}' depends on unknown module '{dependency}'")]
    MissingDependency {
        /// Module declaring the dependency.
        module: String,
        /// The unregistered dependency id.
        dependency: String,
    },

    /// `--only` named a module that is not registered.
    #[error("unknown module '{0}' requested")]
    UnknownModule(String),
}

/// Errors raised while rendering a template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{{` was never closed.
    #[error("line {line}: unterminated tag")]
    UnterminatedTag {
        /// 1-based line of the opening `{{`.
        line: usize,
    },

    /// A variable reference could not be resolved from the device profile.
    #[error("line {line}: unresolved variable '.{name}'")]
    UnresolvedVariable {
        /// Variable name without the leading dot.
        name: String,
        /// 1-based line of the reference.
        line: usize,
    },

    /// A tag whose contents are not a recognised action.
    #[error("line {line}: invalid action '{action}'")]
    InvalidAction {
        /// Raw tag contents.
        action: String,
        /// 1-based line of the tag.
        line: usize,
    },

    /// An `else` or `end` without a matching `if`.
    #[error("line {line}: unexpected '{keyword}'")]
    Unexpected {
        /// The offending keyword.
        keyword: String,
        /// 1-based line of the tag.
        line: usize,
    },

    /// An `if` block that is never closed with `end`.
    #[error("line {line}: 'if' block is never closed")]
    UnclosedBlock {
        /// 1-based line of the opening `if`.
        line: usize,
    },
}

/// Errors raised by external command execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The command exited non-zero.
    #[error("{program} failed (exit {code}): {stderr}")]
    NonZeroExit {
        /// Program name (with arguments when useful).
        program: String,
        /// Exit code, `-1` when terminated by a signal.
        code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The command exceeded its time budget and was killed.
    #[error("timeout: {program} did not finish within {after:?}")]
    Timeout {
        /// Program name.
        program: String,
        /// Budget that was exceeded.
        after: Duration,
    },
}
