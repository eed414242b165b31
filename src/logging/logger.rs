//! Console/file logger and end-of-run summary.
use std::path::PathBuf;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::Log;
use super::utils::log_file_path;
use crate::report::{ModuleStatus, RunOutcome, RunReport, StepResult};

/// Implement the methods of [`Log`] by delegating to inherent methods of the
/// same name on the implementing type.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger emitting through `tracing`.
///
/// All messages are also written to `$XDG_CACHE_HOME/provision/<command>.log`
/// (default `~/.cache/provision/<command>.log`) by the file layer installed
/// in [`init_subscriber`](super::subscriber::init_subscriber), with
/// timestamps and ANSI codes stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger for `command`.
    ///
    /// Only remembers the log file path for the summary; the file itself is
    /// created by the subscriber.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log a dry-run action message.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Print the per-module summary of a finished run.
    #[allow(clippy::print_stdout)]
    pub fn print_summary(&self, report: &RunReport) {
        if let Some(error) = &report.error {
            self.error(error);
        }
        if report.modules.is_empty() && report.outcome == RunOutcome::HardFailure {
            return;
        }

        println!();
        self.stage("Summary");

        for module in &report.modules {
            let status = module.status();
            let (icon, color) = match status {
                ModuleStatus::Skipped => ("·", "\x1b[2m"),
                ModuleStatus::WouldApply => ("~", "\x1b[37m"),
                ModuleStatus::Applied => ("✓", "\x1b[32m"),
                ModuleStatus::Aborted => ("○", "\x1b[33m"),
                ModuleStatus::Failed => ("✗", "\x1b[31m"),
            };
            self.info(&format!("{color}{icon} {} ({status})\x1b[0m", module.id));

            for step in &module.steps {
                match &step.result {
                    StepResult::Failed { cause } => {
                        self.info(&format!("    \x1b[31m{}: {cause}\x1b[0m", step.description));
                    }
                    StepResult::Aborted { cause } => {
                        self.debug(&format!("    {}: {cause}", step.description));
                    }
                    _ => {}
                }
            }
        }

        let c = &report.counts;
        println!();
        self.info(&format!(
            "{} steps: \x1b[32m{} applied\x1b[0m, \x1b[2m{} skipped\x1b[0m, \x1b[37m{} would apply\x1b[0m, \x1b[31m{} failed\x1b[0m, \x1b[33m{} aborted\x1b[0m",
            c.total(),
            c.applied,
            c.skipped,
            c.would_apply,
            c.failed,
            c.aborted,
        ));
        self.info(&format!("outcome: {}", report.outcome));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run);
}
