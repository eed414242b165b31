#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for the `apply` command.
//!
//! These run real shell commands and write real files inside temporary
//! roots, covering idempotency, dry runs, failure isolation between
//! dependent modules, hard failures and the JSON report.

mod common;

use std::fs;

use common::{ConfigBuilder, touch};
use provision_cli::report::{ModuleStatus, RunOutcome, StepResult};

fn results(report: &provision_cli::report::RunReport, id: &str) -> Vec<StepResult> {
    report
        .module(id)
        .unwrap_or_else(|| panic!("module {id} missing from report"))
        .steps
        .iter()
        .map(|s| s.result.clone())
        .collect()
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[test]
fn second_run_only_skips() {
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("marker");
    let dest = scratch.path().join("motd");
    let (check, apply) = touch(&marker);
    let root = ConfigBuilder::new()
        .module("marker", &[], &check, &apply)
        .template("templates/motd.tmpl", &dest)
        .build();
    root.write(
        "templates/motd.tmpl",
        "{{ .name }} ({{ .device_type }}) managed by {{ .owner }}\n",
    );

    let first = root.apply(&root.apply_opts());
    assert_eq!(first.outcome, RunOutcome::Success);
    assert_eq!(first.counts.applied, 2);
    assert_eq!(
        fs::read_to_string(&dest).unwrap(),
        "testbox (headless-server) managed by ops\n"
    );

    let second = root.apply(&root.apply_opts());
    assert_eq!(second.outcome, RunOutcome::Success);
    assert_eq!(second.counts.skipped, 2);
    assert_eq!(second.counts.total(), 2);
    assert!(second.modules.iter().all(|m| m.status() == ModuleStatus::Skipped));
}

#[test]
fn conditional_template_follows_device_class() {
    let scratch = tempfile::tempdir().unwrap();
    let dest = scratch.path().join("power.conf");
    let root = ConfigBuilder::new()
        .template("templates/power.tmpl", &dest)
        .build();
    root.write(
        "templates/power.tmpl",
        "{{- if eq .device_type \"portable\" -}}\nsleep=15\n{{- else -}}\nsleep=never\n{{- end }}\n",
    );

    let report = root.apply(&root.apply_opts());
    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(fs::read_to_string(&dest).unwrap(), "sleep=never\n");
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

#[test]
fn dry_run_changes_nothing() {
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("marker");
    let dest = scratch.path().join("motd");
    let (check, apply) = touch(&marker);
    let root = ConfigBuilder::new()
        .module("marker", &[], &check, &apply)
        .module("after", &["marker"], "false", "true")
        .template("templates/motd.tmpl", &dest)
        .build();
    root.write("templates/motd.tmpl", "hello\n");

    let mut opts = root.apply_opts();
    opts.dry_run = true;
    let report = root.apply(&opts);

    assert_eq!(report.outcome, RunOutcome::Success);
    assert!(report.dry_run);
    assert_eq!(report.counts.would_apply, 3);
    assert!(!marker.exists());
    assert!(!dest.exists());
    assert_eq!(
        results(&report, "marker"),
        vec![StepResult::WouldApply {
            current: "missing".to_string()
        }]
    );
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn failure_aborts_dependents_only() {
    let scratch = tempfile::tempdir().unwrap();
    let (c_check, c_apply) = touch(&scratch.path().join("c"));
    let (b_check, b_apply) = touch(&scratch.path().join("b"));
    let root = ConfigBuilder::new()
        .module("a", &[], "false", "echo broken >&2; exit 3")
        .module("b", &["a"], &b_check, &b_apply)
        .module("c", &[], &c_check, &c_apply)
        .build();

    let report = root.apply(&root.apply_opts());

    assert_eq!(report.outcome, RunOutcome::PartialFailure);
    assert_eq!(report.outcome.exit_code(), 1);
    let a_results = results(&report, "a");
    let [StepResult::Failed { cause }] = a_results.as_slice() else {
        panic!("expected a single failure in a");
    };
    assert!(cause.contains("broken"), "cause: {cause}");
    assert_eq!(
        results(&report, "b"),
        vec![StepResult::Aborted {
            cause: "dependency 'a' did not complete".to_string()
        }]
    );
    assert_eq!(results(&report, "c"), vec![StepResult::Applied]);
    assert!(!scratch.path().join("b").exists());
    assert!(scratch.path().join("c").exists());
}

#[test]
fn apply_that_does_not_converge_fails_postcondition() {
    let root = ConfigBuilder::new()
        .module("stubborn", &[], "false", "true")
        .build();
    let report = root.apply(&root.apply_opts());
    assert_eq!(
        results(&report, "stubborn"),
        vec![StepResult::Failed {
            cause: "postcondition not met".to_string()
        }]
    );
}

#[test]
fn slow_command_times_out() {
    let root = ConfigBuilder::new()
        .module("slow", &[], "false", "sleep 5")
        .build();
    let mut opts = root.apply_opts();
    opts.timeout = 1;
    let report = root.apply(&opts);
    let slow_results = results(&report, "slow");
    let [StepResult::Failed { cause }] = slow_results.as_slice() else {
        panic!("expected a failure");
    };
    assert!(cause.starts_with("timeout"), "cause: {cause}");
}

// ---------------------------------------------------------------------------
// Hard failures
// ---------------------------------------------------------------------------

#[test]
fn cycle_is_rejected_before_any_step_runs() {
    let scratch = tempfile::tempdir().unwrap();
    let (check, apply) = touch(&scratch.path().join("never"));
    let root = ConfigBuilder::new()
        .module("a", &["b"], &check, &apply)
        .module("b", &["a"], &check, &apply)
        .build();

    let report = root.apply(&root.apply_opts());

    assert_eq!(report.outcome, RunOutcome::HardFailure);
    assert_eq!(report.outcome.exit_code(), 2);
    assert!(report.modules.is_empty());
    let error = report.error.unwrap();
    assert!(error.contains("a -> b -> a"), "error: {error}");
    assert!(!scratch.path().join("never").exists());
}

#[test]
fn only_does_not_bypass_cycle_rejection() {
    let scratch = tempfile::tempdir().unwrap();
    let (check, apply) = touch(&scratch.path().join("base"));
    let root = ConfigBuilder::new()
        .module("base", &[], &check, &apply)
        .module("x", &["y"], "true", "true")
        .module("y", &["x"], "true", "true")
        .build();
    let mut opts = root.apply_opts();
    opts.only = vec!["base".to_string()];

    let report = root.apply(&opts);

    assert_eq!(report.outcome, RunOutcome::HardFailure);
    assert!(report.error.unwrap().contains("x -> y -> x"));
    assert!(!scratch.path().join("base").exists());
}

#[test]
fn unknown_device_is_a_hard_failure() {
    let root = ConfigBuilder::new().build();
    let mut opts = root.apply_opts();
    opts.device = "nope".to_string();
    let report = root.apply(&opts);
    assert_eq!(report.outcome, RunOutcome::HardFailure);
    assert!(report.error.unwrap().contains("unknown device 'nope'"));
}

#[test]
fn every_config_problem_is_reported() {
    let root = ConfigBuilder::new()
        .raw("[network]\nservice = 1\n[time]\n")
        .build();
    let report = root.apply(&root.apply_opts());
    assert_eq!(report.outcome, RunOutcome::HardFailure);
    let error = report.error.unwrap();
    for location in ["network.dns", "network.service", "time.server"] {
        assert!(error.contains(location), "{location} missing from: {error}");
    }
}

#[test]
fn unknown_only_module_is_a_hard_failure() {
    let root = ConfigBuilder::new().module("a", &[], "true", "true").build();
    let mut opts = root.apply_opts();
    opts.only = vec!["missing".to_string()];
    let report = root.apply(&opts);
    assert_eq!(report.outcome, RunOutcome::HardFailure);
}

// ---------------------------------------------------------------------------
// Selection and reporting
// ---------------------------------------------------------------------------

#[test]
fn only_runs_selection_and_dependencies() {
    let root = ConfigBuilder::new()
        .module("base", &[], "true", "true")
        .module("app", &["base"], "true", "true")
        .module("other", &[], "true", "true")
        .build();
    let mut opts = root.apply_opts();
    opts.only = vec!["app".to_string()];
    let report = root.apply(&opts);
    let ids: Vec<&str> = report.modules.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["base", "app"]);
}

#[test]
fn json_report_is_written() {
    let root = ConfigBuilder::new()
        .module("noop", &[], "true", "true")
        .build();
    let path = root.file("report.json");
    let mut opts = root.apply_opts();
    opts.report = Some(path.clone());
    root.apply(&opts);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["device"], "testbox");
    assert_eq!(json["outcome"], "success");
    assert_eq!(json["modules"][0]["steps"][0]["result"], "skipped");
    assert_eq!(json["counts"]["skipped"], 1);
}
