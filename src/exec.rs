//! External command execution behind the [`Executor`] seam.
//!
//! Steps never spawn processes directly: they go through an [`Executor`] so
//! that package managers and preference utilities can be replaced by fakes in
//! tests, and so that every command is bounded by the per-step timeout.
use std::io::Read as _;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::ExecError;

/// Interval between child-process liveness polls while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its result regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the process cannot be started and
    /// [`ExecError::Timeout`] if it does not finish within `timeout`.
    fn run_unchecked(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;

    /// Run a command, failing with [`ExecError::NonZeroExit`] on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Propagates [`Executor::run_unchecked`] errors and non-zero exits.
    fn run(&self, program: &str, args: &[&str], timeout: Option<Duration>) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args, timeout)?;
        if !result.success {
            return Err(ExecError::NonZeroExit {
                program: label(program, args),
                code: result.code.unwrap_or(-1),
                stderr: result.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(result)
    }
}

/// Short human-readable label for a command line.
fn label(program: &str, args: &[&str]) -> String {
    if program == "sudo"
        && let Some(wrapped) = args.iter().find(|a| !a.starts_with('-'))
    {
        return format!("sudo {wrapped}");
    }
    program.to_string()
}

/// [`Executor`] that runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn spawn_error(program: &str, source: std::io::Error) -> anyhow::Error {
        ExecError::Spawn {
            program: program.to_string(),
            source,
        }
        .into()
    }

    /// Kill the child and everything it spawned.
    ///
    /// The child leads its own process group, so signalling the negated pid
    /// reaches forked shells and helpers that still hold the output pipes.
    fn kill_group(child: &mut Child) {
        #[cfg(unix)]
        {
            Command::new("kill")
                .args(["-KILL", "--", &format!("-{}", child.id())])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .ok();
        }
        child.kill().ok();
        child.wait().ok();
    }

    /// Run with a deadline: poll the child and kill its process group once the
    /// budget is spent.
    fn run_with_deadline(program: &str, args: &[&str], timeout: Duration) -> Result<ExecResult> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| Self::spawn_error(program, e))?;

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).ok();
                buf
            })
        });
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                pipe.read_to_end(&mut buf).ok();
                buf
            })
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= timeout => {
                    Self::kill_group(&mut child);
                    return Err(ExecError::Timeout {
                        program: label(program, args),
                        after: timeout,
                    }
                    .into());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Self::spawn_error(program, e)),
            }
        };

        let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
            handle
                .and_then(|h| h.join().ok())
                .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
                .unwrap_or_default()
        };

        Ok(ExecResult {
            stdout: collect(stdout),
            stderr: collect(stderr),
            success: status.success(),
            code: status.code(),
        })
    }
}

impl Executor for SystemExecutor {
    fn run_unchecked(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        match timeout {
            Some(limit) => Self::run_with_deadline(program, args, limit),
            None => Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .output()
                .map(ExecResult::from)
                .map_err(|e| Self::spawn_error(program, e)),
        }
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
