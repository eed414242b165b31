use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, ValidateOpts};
use crate::logging::Logger;
use crate::platform::Platform;

/// Load and validate configuration for a device, then plan all its modules.
///
/// No step is checked or applied.
///
/// # Errors
///
/// Returns an error if any document is invalid, the device is unknown, or
/// the module graph cannot be planned.
pub fn run(global: &GlobalOpts, opts: &ValidateOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, &opts.device, Platform::detect(), log)?;
    let plan = setup.plan(&[])?;
    let steps: usize = setup.registry.modules().map(|m| m.steps.len()).sum();
    log.info(&format!(
        "configuration is valid: {} module(s), {steps} step(s)",
        plan.len()
    ));
    if !setup.document.warnings().is_empty() {
        log.warn(&format!(
            "{} warning(s); see above",
            setup.document.warnings().len()
        ));
    }
    Ok(())
}
