use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::DeviceProfile;
use crate::exec::{ExecResult, Executor};
use crate::logging::Log;
use crate::platform::Platform;
use crate::privilege::{Escalator, Privilege};

/// Shared, run-scoped state handed to every step.
pub struct RunContext {
    /// Device the run targets.
    pub profile: Arc<DeviceProfile>,
    /// Detected platform information.
    pub platform: Arc<Platform>,
    /// Logger for output.
    pub log: Arc<dyn Log>,
    /// Whether to report changes instead of making them.
    pub dry_run: bool,
    /// User's home directory, for `~` expansion.
    pub home: PathBuf,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Privilege state, escalated at most once per run.
    pub privilege: Privilege,
    /// Upper bound on every external command.
    pub timeout: Duration,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("profile", &self.profile.name)
            .field("platform", &self.platform)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("home", &self.home)
            .field("executor", &"<dyn Executor>")
            .field("privilege", &self.privilege)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RunContext {
    /// Creates a new context for a run.
    ///
    /// # Errors
    ///
    /// Returns an error if the HOME environment variable is not set.
    pub fn new(
        profile: Arc<DeviceProfile>,
        platform: Arc<Platform>,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        escalator: Arc<dyn Escalator>,
        dry_run: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))?;
        Ok(Self {
            profile,
            platform,
            log,
            dry_run,
            home: PathBuf::from(home),
            executor,
            privilege: Privilege::new(escalator),
            timeout,
        })
    }

    /// Replace the home directory used for `~` expansion.
    #[must_use]
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    /// Run a command, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error on spawn failure, non-zero exit or timeout.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.executor.run(program, args, Some(self.timeout))
    }

    /// Run a command and return its result regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns an error on spawn failure or timeout.
    pub fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.executor.run_unchecked(program, args, Some(self.timeout))
    }

    /// Run a command with the privileges acquired for this run.
    ///
    /// # Errors
    ///
    /// Returns an error if privileges are not held, or as [`RunContext::run`].
    pub fn run_privileged(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let (program, args) = self.privilege.command(program, args)?;
        self.run(program, &args)
    }

    /// Run `program` privileged when `privileged` is set, directly otherwise.
    ///
    /// # Errors
    ///
    /// See [`RunContext::run_privileged`].
    pub fn run_as(&self, privileged: bool, program: &str, args: &[&str]) -> Result<ExecResult> {
        if privileged {
            self.run_privileged(program, args)
        } else {
            self.run(program, args)
        }
    }

    /// Expand a leading `~` to the home directory.
    #[must_use]
    pub fn expand_path(&self, path: &str) -> PathBuf {
        if path == "~" {
            return self.home.clone();
        }
        path.strip_prefix("~/")
            .map_or_else(|| PathBuf::from(path), |rest| self.home.join(rest))
    }
}
