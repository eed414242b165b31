//! Idempotent steps: each reads current state with `check` and converges it
//! with `apply`.
pub mod file;
pub mod firewall;
pub mod network;
pub mod package;
pub mod preference;
pub mod shell;
pub mod system;

use std::fmt;

use anyhow::{Result, bail};

use crate::runner::RunContext;

/// Observed state of a step's target.
///
/// # Examples
///
/// ```
/// use provision_cli::steps::StepState;
///
/// let differs = StepState::Differs { current: "8.8.8.8".into() };
/// assert!(StepState::Satisfied.is_satisfied());
/// assert!(!differs.is_satisfied());
/// assert_eq!(differs.to_string(), "8.8.8.8");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// Already in the desired state.
    Satisfied,
    /// The target does not exist.
    Missing,
    /// The target exists with a different value.
    Differs {
        /// The current value.
        current: String,
    },
}

impl StepState {
    /// Whether the step has nothing to do.
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => f.write_str("satisfied"),
            Self::Missing => f.write_str("missing"),
            Self::Differs { current } => f.write_str(current),
        }
    }
}

/// One idempotent action.
///
/// `check` must not change the system. `apply` may assume `check` reported
/// an unsatisfied state and must leave the system such that a following
/// `check` reports [`StepState::Satisfied`].
pub trait Step: Send + Sync + fmt::Debug {
    /// Human-readable description, unique within its module.
    fn description(&self) -> String;

    /// Whether `apply` needs elevated privileges.
    fn requires_privilege(&self) -> bool {
        false
    }

    /// Read the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn check(&self, ctx: &RunContext) -> Result<StepState>;

    /// Converge the system to the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be made.
    fn apply(&self, ctx: &RunContext) -> Result<()>;
}

/// Fail unless running on macOS.
pub(crate) fn require_macos(ctx: &RunContext, what: &str) -> Result<()> {
    if !ctx.platform.is_macos() {
        bail!("{what} is not supported on {}", ctx.platform.os);
    }
    Ok(())
}
