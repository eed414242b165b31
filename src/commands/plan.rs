use std::fmt::Write as _;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, PlanOpts};
use crate::logging::Logger;
use crate::modules::ExecutionPlan;
use crate::platform::Platform;

/// Compute the execution plan for a device without checking any step.
///
/// # Errors
///
/// Returns an error if configuration, device selection or planning fails.
pub fn compute(global: &GlobalOpts, opts: &PlanOpts, log: &Logger) -> Result<(CommandSetup, ExecutionPlan)> {
    let setup = CommandSetup::init(global, &opts.device, Platform::detect(), log)?;
    let plan = setup.plan(&opts.only)?;
    Ok((setup, plan))
}

/// Render a plan as one line per module with its steps indented below.
#[must_use]
pub fn describe(setup: &CommandSetup, plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    for (index, id) in plan.ids().enumerate() {
        let Ok(module) = setup.registry.lookup(id) else {
            continue;
        };
        // Writing into a String cannot fail.
        let _ = write!(out, "{}. {id}", index + 1);
        if !module.dependencies.is_empty() {
            let _ = write!(out, " (after {})", module.dependencies.join(", "));
        }
        out.push('\n');
        for step in &module.steps {
            let marker = if step.requires_privilege() { " [sudo]" } else { "" };
            let _ = writeln!(out, "   - {}{marker}", step.description());
        }
    }
    out
}

/// Run the plan command.
///
/// # Errors
///
/// See [`compute`].
#[allow(clippy::print_stdout)]
pub fn run(global: &GlobalOpts, opts: &PlanOpts, log: &Logger) -> Result<()> {
    let (setup, plan) = compute(global, opts, log)?;
    log.stage("Execution plan");
    print!("{}", describe(&setup, &plan));
    Ok(())
}
