// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed configuration root and a fluent
// builder so each integration test can set up an isolated environment
// without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use provision_cli::cli::{ApplyOpts, DEFAULT_TIMEOUT_SECS, GlobalOpts};
use provision_cli::commands::apply::{self, Runtime};
use provision_cli::exec::SystemExecutor;
use provision_cli::logging::Logger;
use provision_cli::platform::{Os, Platform};
use provision_cli::privilege::Escalator;
use provision_cli::report::RunReport;

/// Device defined by every test root.
pub const DEVICE: &str = "testbox";

/// Escalator for tests: never prompts, runs privileged commands directly.
#[derive(Debug, Default)]
pub struct NoopEscalator;

impl Escalator for NoopEscalator {
    fn acquire(&self, _reason: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn wrapper(&self) -> Option<&'static str> {
        None
    }
}

/// Builder for `conf/provision.toml` in a temporary root.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    body: String,
}

impl ConfigBuilder {
    /// Start from the schema version and the test device.
    pub fn new() -> Self {
        let mut body = String::from("schema_version = 1\n\n");
        writeln!(
            body,
            "[devices.{DEVICE}]\nclass = \"headless-server\"\n[devices.{DEVICE}.vars]\nowner = \"ops\"\n"
        )
        .unwrap();
        Self { body }
    }

    /// Add a user module with a single shell step.
    #[must_use]
    pub fn module(mut self, id: &str, depends_on: &[&str], check: &str, apply: &str) -> Self {
        let deps = depends_on
            .iter()
            .map(|d| format!("{d:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            self.body,
            "[modules.{id}]\ndepends_on = [{deps}]\n[[modules.{id}.steps]]\ndescription = \"{id} step\"\ncheck = {check:?}\napply = {apply:?}\n"
        )
        .unwrap();
        self
    }

    /// Add a template file entry.
    #[must_use]
    pub fn template(mut self, source: &str, destination: &Path) -> Self {
        writeln!(
            self.body,
            "[[templates.files]]\nsource = {source:?}\ndestination = {:?}\n",
            destination.display().to_string()
        )
        .unwrap();
        self
    }

    /// Append raw TOML.
    #[must_use]
    pub fn raw(mut self, toml: &str) -> Self {
        self.body.push_str(toml);
        self.body.push('\n');
        self
    }

    /// Write the document into a fresh temporary root.
    pub fn build(self) -> TestRoot {
        let root = tempfile::tempdir().expect("create temp dir");
        let conf = root.path().join("conf");
        std::fs::create_dir_all(&conf).expect("create conf dir");
        std::fs::write(conf.join("provision.toml"), &self.body).expect("write provision.toml");
        TestRoot { root }
    }
}

/// An isolated configuration root backed by a [`tempfile::TempDir`].
pub struct TestRoot {
    /// Temporary directory holding `conf/` and any templates.
    pub root: tempfile::TempDir,
}

impl TestRoot {
    /// Path to the root.
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Path of `name` inside the root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Write a file relative to the root.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.file(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }

    /// Global options pointing at this root.
    pub fn global(&self) -> GlobalOpts {
        GlobalOpts {
            root: Some(self.path().to_path_buf()),
            config: Vec::new(),
        }
    }

    /// Options for `apply` on the test device.
    pub fn apply_opts(&self) -> ApplyOpts {
        ApplyOpts {
            device: DEVICE.to_string(),
            dry_run: false,
            only: Vec::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            report: None,
        }
    }

    /// Run `apply` with real processes and no privilege prompts.
    pub fn apply(&self, opts: &ApplyOpts) -> RunReport {
        let log = Arc::new(Logger::new("test"));
        apply::run_with(&self.global(), opts, &log, &runtime())
    }
}

/// Linux runtime backed by real processes and [`NoopEscalator`].
pub fn runtime() -> Runtime {
    Runtime {
        platform: Platform::new(Os::Linux),
        executor: Arc::new(SystemExecutor),
        escalator: Arc::new(NoopEscalator),
    }
}

/// Shell check/apply pair that converges on the existence of `marker`.
pub fn touch(marker: &Path) -> (String, String) {
    let path = marker.display();
    (format!("test -e '{path}'"), format!("touch '{path}'"))
}
