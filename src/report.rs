//! Per-step results, aggregated into a [`RunReport`] once a run finishes.
use std::fmt;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;

/// Outcome of executing a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepResult {
    /// Already satisfied; apply was never invoked.
    Skipped,
    /// Apply ran and the postcondition holds.
    Applied,
    /// Dry run: the step would change the system.
    WouldApply {
        /// Description of the state that would be replaced.
        current: String,
    },
    /// Check, apply or the postcondition failed.
    Failed {
        /// Full error chain.
        cause: String,
    },
    /// Not attempted because an earlier step or a dependency failed.
    Aborted {
        /// Why the step was not attempted.
        cause: String,
    },
}

impl StepResult {
    /// Whether this result lets dependent work proceed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Skipped | Self::Applied | Self::WouldApply { .. })
    }

    const fn status(&self) -> ModuleStatus {
        match self {
            Self::Skipped => ModuleStatus::Skipped,
            Self::Applied => ModuleStatus::Applied,
            Self::WouldApply { .. } => ModuleStatus::WouldApply,
            Self::Failed { .. } => ModuleStatus::Failed,
            Self::Aborted { .. } => ModuleStatus::Aborted,
        }
    }
}

/// Result of one step, labelled with its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Human-readable step description.
    pub description: String,
    /// What happened.
    #[serde(flatten)]
    pub result: StepResult,
}

/// Aggregate status of a module.
///
/// Variants are declared in ascending priority: a module takes the highest
/// status among its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// Every step was already satisfied.
    Skipped,
    /// Dry run with at least one pending change.
    WouldApply,
    /// At least one step changed the system.
    Applied,
    /// Steps were not attempted.
    Aborted,
    /// At least one step failed.
    Failed,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::WouldApply => "would apply",
            Self::Applied => "applied",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        })
    }
}

/// Results of all steps of one module, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    /// Module id.
    pub id: String,
    /// Step results.
    pub steps: Vec<StepReport>,
    /// Why the whole module was not attempted, when a dependency failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ModuleReport {
    /// Highest-priority status among the steps; `Skipped` when there are none.
    ///
    /// A module aborted as a whole is `Aborted` even without steps.
    #[must_use]
    pub fn status(&self) -> ModuleStatus {
        let floor = if self.aborted.is_some() {
            ModuleStatus::Aborted
        } else {
            ModuleStatus::Skipped
        };
        self.steps
            .iter()
            .map(|s| s.result.status())
            .fold(floor, ModuleStatus::max)
    }

    /// Whether every step succeeded, so dependents may run.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.aborted.is_none() && self.steps.iter().all(|s| s.result.is_success())
    }
}

/// Step counts by result kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Steps already satisfied.
    pub skipped: usize,
    /// Steps that changed the system.
    pub applied: usize,
    /// Steps that would change the system (dry run).
    pub would_apply: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Steps that were not attempted.
    pub aborted: usize,
}

impl Counts {
    /// Total number of steps.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.skipped + self.applied + self.would_apply + self.failed + self.aborted
    }

    fn add(&mut self, result: &StepResult) {
        match result {
            StepResult::Skipped => self.skipped += 1,
            StepResult::Applied => self.applied += 1,
            StepResult::WouldApply { .. } => self.would_apply += 1,
            StepResult::Failed { .. } => self.failed += 1,
            StepResult::Aborted { .. } => self.aborted += 1,
        }
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No step failed or was aborted.
    Success,
    /// Some steps failed or were aborted.
    PartialFailure,
    /// Nothing could run (invalid configuration, unknown device, cycle, …).
    HardFailure,
}

impl RunOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::PartialFailure => 1,
            Self::HardFailure => 2,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::PartialFailure => "partial failure",
            Self::HardFailure => "hard failure",
        })
    }
}

/// Finalized, immutable record of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Device the run targeted.
    pub device: String,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Module results in plan order.
    pub modules: Vec<ModuleReport>,
    /// Step counts.
    pub counts: Counts,
    /// Overall outcome.
    pub outcome: RunOutcome,
    /// Error that prevented the run, for hard failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    /// Report for a run that could not start.
    #[must_use]
    pub fn hard_failure(device: &str, dry_run: bool, error: &anyhow::Error) -> Self {
        Self {
            device: device.to_string(),
            dry_run,
            modules: Vec::new(),
            counts: Counts::default(),
            outcome: RunOutcome::HardFailure,
            error: Some(format!("{error:#}")),
        }
    }

    /// Module report by id.
    #[must_use]
    pub fn module(&self, id: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing run report")
    }

    /// Write the JSON report to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("writing report to {}", path.display()))
    }
}

/// Accumulates step results during a run.
#[derive(Debug)]
pub struct Reporter {
    device: String,
    dry_run: bool,
    modules: Vec<ModuleReport>,
}

impl Reporter {
    /// Start an empty report.
    #[must_use]
    pub fn new(device: &str, dry_run: bool) -> Self {
        Self {
            device: device.to_string(),
            dry_run,
            modules: Vec::new(),
        }
    }

    /// Open a section for `id`; subsequent results are recorded under it.
    pub fn begin_module(&mut self, id: &str) {
        self.modules.push(ModuleReport {
            id: id.to_string(),
            steps: Vec::new(),
            aborted: None,
        });
    }

    /// Mark the current module as not attempted.
    pub fn abort_module(&mut self, cause: &str) {
        if let Some(module) = self.modules.last_mut() {
            module.aborted = Some(cause.to_string());
        }
    }

    /// Record a step result under the current module.
    ///
    /// Results recorded before any module was opened are dropped.
    pub fn record(&mut self, description: &str, result: StepResult) {
        if let Some(module) = self.modules.last_mut() {
            module.steps.push(StepReport {
                description: description.to_string(),
                result,
            });
        }
    }

    /// The module currently being recorded.
    #[must_use]
    pub fn current(&self) -> Option<&ModuleReport> {
        self.modules.last()
    }

    /// Close the run and compute counts and outcome.
    #[must_use]
    pub fn finalize(self) -> RunReport {
        let mut counts = Counts::default();
        for step in self.modules.iter().flat_map(|m| &m.steps) {
            counts.add(&step.result);
        }
        let any_aborted = self.modules.iter().any(|m| m.aborted.is_some());
        let outcome = if counts.failed == 0 && counts.aborted == 0 && !any_aborted {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        };
        RunReport {
            device: self.device,
            dry_run: self.dry_run,
            modules: self.modules,
            counts,
            outcome,
            error: None,
        }
    }
}
