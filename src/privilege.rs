//! Run-scoped privilege escalation.
//!
//! Privilege is never requested up front. The first step that needs it
//! triggers a single escalation through an [`Escalator`]; the outcome
//! (success *or* failure) is cached in [`Privilege`] for the rest of the run
//! so the operator is prompted at most once.
use std::process::Command;
use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result, bail};

/// Obtains elevated privileges for the current run.
#[cfg_attr(test, mockall::automock)]
pub trait Escalator: Send + Sync + std::fmt::Debug {
    /// Acquire privileges, prompting the operator if necessary.
    ///
    /// `reason` names the step that first needed privileges.
    ///
    /// # Errors
    ///
    /// Returns an error if privileges cannot be obtained.
    fn acquire(&self, reason: &str) -> Result<()>;

    /// Program that privileged commands are wrapped in, or `None` when the
    /// process already runs with full privileges.
    fn wrapper(&self) -> Option<&'static str>;
}

/// Escalates through `sudo`, or does nothing when already running as root.
#[derive(Debug, Clone, Copy)]
pub struct SudoEscalator {
    is_root: bool,
}

impl SudoEscalator {
    /// Detect whether the current user is root.
    #[must_use]
    pub fn detect() -> Self {
        let is_root = Command::new("id")
            .arg("-u")
            .output()
            .is_ok_and(|o| String::from_utf8_lossy(&o.stdout).trim() == "0");
        Self { is_root }
    }
}

impl Escalator for SudoEscalator {
    fn acquire(&self, reason: &str) -> Result<()> {
        if self.is_root {
            return Ok(());
        }

        // A cached sudo timestamp avoids prompting entirely.
        let cached = Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .is_ok_and(|s| s.success());
        if cached {
            return Ok(());
        }

        tracing::warn!("administrator privileges required: {reason}");
        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .context("failed to execute sudo")?;
        if !status.success() {
            bail!("failed to acquire sudo privileges");
        }
        Ok(())
    }

    fn wrapper(&self) -> Option<&'static str> {
        if self.is_root { None } else { Some("sudo") }
    }
}

/// Privilege state for one run.
///
/// Holds the escalator and the cached outcome of the first escalation.
#[derive(Debug)]
pub struct Privilege {
    escalator: Arc<dyn Escalator>,
    outcome: OnceLock<Result<(), String>>,
}

impl Privilege {
    /// Create an un-escalated privilege state.
    #[must_use]
    pub fn new(escalator: Arc<dyn Escalator>) -> Self {
        Self {
            escalator,
            outcome: OnceLock::new(),
        }
    }

    /// Escalate on first call; return the cached outcome afterwards.
    ///
    /// # Errors
    ///
    /// Returns the (cached) escalation failure.
    pub fn ensure(&self, reason: &str) -> Result<()> {
        self.outcome
            .get_or_init(|| {
                self.escalator
                    .acquire(reason)
                    .map_err(|e| format!("{e:#}"))
            })
            .clone()
            .map_err(|e| anyhow::anyhow!("privilege escalation failed: {e}"))
    }

    /// Whether privileges were successfully acquired during this run.
    #[must_use]
    pub fn is_held(&self) -> bool {
        matches!(self.outcome.get(), Some(Ok(())))
    }

    /// Build the argument vector for running `program` with privileges.
    ///
    /// # Errors
    ///
    /// Returns an error if privileges were not acquired first.
    pub fn command<'a>(&self, program: &'a str, args: &[&'a str]) -> Result<(&'a str, Vec<&'a str>)> {
        if !self.is_held() {
            bail!("'{program}' needs privileges that were not acquired for this step");
        }
        Ok(match self.escalator.wrapper() {
            Some(wrapper) => {
                let mut full = vec!["-n", program];
                full.extend_from_slice(args);
                (wrapper, full)
            }
            None => (program, args.to_vec()),
        })
    }
}
