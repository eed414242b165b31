use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{ApplyOpts, GlobalOpts};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::platform::Platform;
use crate::privilege::{Escalator, SudoEscalator};
use crate::report::RunReport;
use crate::runner::{self, RunContext};

/// Process-level collaborators of a run.
#[derive(Debug, Clone)]
pub struct Runtime {
    /// Platform steps are executed on.
    pub platform: Platform,
    /// Process executor.
    pub executor: Arc<dyn Executor>,
    /// Privilege escalation.
    pub escalator: Arc<dyn Escalator>,
}

impl Runtime {
    /// The real system: detected platform, spawned processes, `sudo`.
    #[must_use]
    pub fn system() -> Self {
        Self {
            platform: Platform::detect(),
            executor: Arc::new(SystemExecutor),
            escalator: Arc::new(SudoEscalator::detect()),
        }
    }
}

/// Run the apply command against the real system.
///
/// Never fails: problems that prevent the run become a hard-failure report.
#[must_use]
pub fn run(global: &GlobalOpts, opts: &ApplyOpts, log: &Arc<Logger>) -> RunReport {
    run_with(global, opts, log, &Runtime::system())
}

/// Run the apply command with explicit collaborators.
#[must_use]
pub fn run_with(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    log: &Arc<Logger>,
    runtime: &Runtime,
) -> RunReport {
    log.info(&format!("provision {}", crate::VERSION));
    if opts.dry_run {
        log.info("dry run: no changes will be made");
    }

    let report = execute(global, opts, log, runtime)
        .unwrap_or_else(|e| RunReport::hard_failure(&opts.device, opts.dry_run, &e));

    log.print_summary(&report);
    if let Some(path) = &opts.report
        && let Err(e) = report.write_json(path)
    {
        log.error(&format!("{e:#}"));
    }
    report
}

fn execute(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    log: &Arc<Logger>,
    runtime: &Runtime,
) -> Result<RunReport> {
    let setup = CommandSetup::init(global, &opts.device, runtime.platform.clone(), log)?;
    let plan = setup.plan(&opts.only)?;
    log.info(&format!(
        "plan: {}",
        plan.ids().collect::<Vec<_>>().join(" -> ")
    ));

    let ctx = RunContext::new(
        Arc::new(setup.profile),
        Arc::new(setup.platform),
        Arc::clone(log) as Arc<dyn Log>,
        Arc::clone(&runtime.executor),
        Arc::clone(&runtime.escalator),
        opts.dry_run,
        Duration::from_secs(opts.timeout),
    )?;

    Ok(runner::run_plan(&plan, &setup.registry, &ctx)?)
}
