use anyhow::{Context as _, Result};

use super::{Step, StepState};
use crate::runner::RunContext;
use crate::template;

/// A user-defined step made of two shell commands.
///
/// Both commands are templates rendered against the device profile. The
/// check command exiting zero means the step is satisfied.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Description shown in reports.
    pub description: String,
    /// Command whose success means nothing needs doing.
    pub check: String,
    /// Command that converges the system.
    pub apply: String,
    /// Whether `apply` runs with elevated privileges.
    pub privileged: bool,
}

impl ShellCommand {
    fn render(&self, ctx: &RunContext, command: &str, which: &str) -> Result<String> {
        template::render(command, &ctx.profile)
            .with_context(|| format!("rendering {which} command of '{}'", self.description))
    }
}

impl Step for ShellCommand {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn requires_privilege(&self) -> bool {
        self.privileged
    }

    fn check(&self, ctx: &RunContext) -> Result<StepState> {
        let command = self.render(ctx, &self.check, "check")?;
        let result = ctx.run_unchecked("sh", &["-c", &command])?;
        Ok(if result.success {
            StepState::Satisfied
        } else {
            StepState::Missing
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        let command = self.render(ctx, &self.apply, "apply")?;
        ctx.run_as(self.privileged, "sh", &["-c", &command])?;
        Ok(())
    }
}
