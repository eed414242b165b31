//! Executes an [`ExecutionPlan`]: every step goes through check, apply and
//! re-check, and no step error escapes the step that raised it.
mod context;

pub use context::RunContext;

use std::collections::BTreeSet;

use crate::error::{ExecError, RegistryError};
use crate::logging::MODULE_SPAN;
use crate::modules::{ExecutionPlan, ModuleRegistry};
use crate::report::{ModuleReport, Reporter, RunReport, StepResult};
use crate::steps::Step;

/// Cause recorded when apply succeeded but check still reports work to do.
pub const POSTCONDITION_NOT_MET: &str = "postcondition not met";

/// Run one step through the check/apply/re-check protocol.
pub fn execute_step(step: &dyn Step, ctx: &RunContext) -> StepResult {
    let desc = step.description();

    let state = match step.check(ctx) {
        Ok(state) => state,
        Err(e) => return failed(ctx, &desc, "check", &e),
    };
    if state.is_satisfied() {
        ctx.log.debug(&format!("ok: {desc}"));
        return StepResult::Skipped;
    }

    if ctx.dry_run {
        ctx.log
            .dry_run(&format!("would apply {desc} (currently {state})"));
        return StepResult::WouldApply {
            current: state.to_string(),
        };
    }

    if step.requires_privilege()
        && let Err(e) = ctx.privilege.ensure(&desc)
    {
        return failed(ctx, &desc, "privilege", &e);
    }

    ctx.log.debug(&format!("applying {desc} (currently {state})"));
    if let Err(e) = step.apply(ctx) {
        return failed(ctx, &desc, "apply", &e);
    }

    match step.check(ctx) {
        Ok(after) if after.is_satisfied() => {
            ctx.log.info(&format!("applied: {desc}"));
            StepResult::Applied
        }
        Ok(after) => {
            ctx.log.error(&format!(
                "{desc}: {POSTCONDITION_NOT_MET} (still {after})"
            ));
            StepResult::Failed {
                cause: POSTCONDITION_NOT_MET.to_string(),
            }
        }
        Err(e) => failed(ctx, &desc, "re-check", &e),
    }
}

fn failed(ctx: &RunContext, desc: &str, phase: &str, err: &anyhow::Error) -> StepResult {
    let cause = cause_of(err);
    ctx.log.error(&format!("{desc}: {phase} failed: {cause}"));
    StepResult::Failed { cause }
}

/// Render an error chain as a failure cause.
///
/// A timeout anywhere in the chain is reported as the cause itself so the
/// report always starts with `timeout`.
#[must_use]
pub fn cause_of(err: &anyhow::Error) -> String {
    err.chain()
        .find_map(|e| match e.downcast_ref::<ExecError>() {
            Some(timeout @ ExecError::Timeout { .. }) => Some(timeout.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("{err:#}"))
}

/// Execute every module of `plan` in order.
///
/// Steps of a module run in declared order until the first failure, after
/// which the rest are aborted. A module whose dependency did not fully
/// succeed is aborted without running any step. Dry-run results count as
/// success for dependents.
///
/// # Errors
///
/// Returns [`RegistryError::NotFound`] if the plan names a module the
/// registry does not hold.
pub fn run_plan(
    plan: &ExecutionPlan,
    registry: &ModuleRegistry,
    ctx: &RunContext,
) -> Result<RunReport, RegistryError> {
    let mut reporter = Reporter::new(&ctx.profile.name, ctx.dry_run);
    let mut unhealthy: BTreeSet<&str> = BTreeSet::new();

    for id in plan.ids() {
        let module = registry.lookup(id)?;
        reporter.begin_module(id);
        ctx.log.stage(id);
        let span = tracing::info_span!(MODULE_SPAN, id = %id);
        let _entered = span.enter();

        if let Some(dep) = module
            .dependencies
            .iter()
            .find(|d| unhealthy.contains(d.as_str()))
        {
            let cause = format!("dependency '{dep}' did not complete");
            ctx.log.warn(&format!("skipping {id}: {cause}"));
            reporter.abort_module(&cause);
            for step in &module.steps {
                reporter.record(
                    &step.description(),
                    StepResult::Aborted {
                        cause: cause.clone(),
                    },
                );
            }
            unhealthy.insert(id);
            continue;
        }

        let mut first_failure: Option<String> = None;
        for step in &module.steps {
            let desc = step.description();
            if let Some(failed_step) = &first_failure {
                reporter.record(
                    &desc,
                    StepResult::Aborted {
                        cause: format!("earlier step '{failed_step}' failed"),
                    },
                );
                continue;
            }
            let result = execute_step(step.as_ref(), ctx);
            if matches!(result, StepResult::Failed { .. }) {
                first_failure = Some(desc.clone());
            }
            reporter.record(&desc, result);
        }

        if !reporter.current().is_some_and(ModuleReport::succeeded) {
            unhealthy.insert(id);
        }
    }

    Ok(reporter.finalize())
}

/// Shared fakes for step and runner unit tests.
#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub mod test_helpers {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;

    use super::RunContext;
    use crate::config::{DeviceClass, DeviceProfile};
    use crate::exec::{ExecResult, Executor};
    use crate::logging::Log;
    use crate::platform::{Os, Platform};
    use crate::privilege::{Escalator, Privilege};

    type Handler = Box<dyn Fn(&str) -> Option<ExecResult> + Send + Sync>;

    /// Executor that answers from a closure keyed on the full command line.
    ///
    /// Every invocation is recorded; a command the handler does not answer
    /// is an error.
    pub struct FakeExecutor {
        handler: Handler,
        calls: Mutex<Vec<(String, Option<Duration>)>>,
    }

    impl std::fmt::Debug for FakeExecutor {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("FakeExecutor").finish_non_exhaustive()
        }
    }

    impl FakeExecutor {
        /// Create a fake answering with `handler`.
        pub fn new(
            handler: impl Fn(&str) -> Option<ExecResult> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Command lines issued so far.
        pub fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(line, _)| line.clone())
                .collect()
        }

        /// Timeouts passed with each call.
        pub fn timeouts(&self) -> Vec<Option<Duration>> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    impl Executor for FakeExecutor {
        fn run_unchecked(
            &self,
            program: &str,
            args: &[&str],
            timeout: Option<Duration>,
        ) -> Result<ExecResult> {
            let line = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");
            self.calls.lock().unwrap().push((line.clone(), timeout));
            (self.handler)(&line).ok_or_else(|| anyhow::anyhow!("unexpected command: {line}"))
        }

        fn which(&self, _: &str) -> bool {
            true
        }
    }

    /// Successful result with `stdout`.
    pub fn ok(stdout: &str) -> ExecResult {
        ExecResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed result with `stderr`.
    pub fn fail(stderr: &str) -> ExecResult {
        ExecResult {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        }
    }

    /// Escalator that always succeeds and wraps commands in `sudo`.
    #[derive(Debug, Default)]
    pub struct GrantingEscalator;

    impl Escalator for GrantingEscalator {
        fn acquire(&self, _: &str) -> Result<()> {
            Ok(())
        }

        fn wrapper(&self) -> Option<&'static str> {
            Some("sudo")
        }
    }

    /// Log that keeps every message in memory as `"<kind>: <msg>"`.
    #[derive(Debug, Default)]
    pub struct MemoryLog(Mutex<Vec<String>>);

    impl MemoryLog {
        /// Messages recorded so far.
        pub fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, kind: &str, msg: &str) {
            self.0.lock().unwrap().push(format!("{kind}: {msg}"));
        }
    }

    impl Log for MemoryLog {
        fn stage(&self, msg: &str) {
            self.push("stage", msg);
        }
        fn info(&self, msg: &str) {
            self.push("info", msg);
        }
        fn debug(&self, msg: &str) {
            self.push("debug", msg);
        }
        fn warn(&self, msg: &str) {
            self.push("warn", msg);
        }
        fn error(&self, msg: &str) {
            self.push("error", msg);
        }
        fn dry_run(&self, msg: &str) {
            self.push("dry_run", msg);
        }
    }

    /// Profile `mbp` (portable) with a `font` variable.
    pub fn profile() -> DeviceProfile {
        let vars = BTreeMap::from([("font".to_string(), "Iosevka".to_string())]);
        DeviceProfile::new("mbp", DeviceClass::Portable, vars)
    }

    /// Context over `executor` with a granting escalator, 5 s timeout.
    pub fn context(executor: Arc<dyn Executor>, os: Os) -> RunContext {
        context_with(executor, os, Arc::new(GrantingEscalator), Arc::new(MemoryLog::default()))
    }

    /// Context with explicit escalator and log.
    pub fn context_with(
        executor: Arc<dyn Executor>,
        os: Os,
        escalator: Arc<dyn Escalator>,
        log: Arc<dyn Log>,
    ) -> RunContext {
        RunContext {
            profile: Arc::new(profile()),
            platform: Arc::new(Platform::new(os)),
            log,
            dry_run: false,
            home: std::path::PathBuf::from("/home/test"),
            executor,
            privilege: Privilege::new(escalator),
            timeout: Duration::from_secs(5),
        }
    }
}
