//! Idempotent, module-based machine provisioning.
//!
//! A device's desired state is declared in TOML documents under `conf/`.
//! The engine turns that declaration into modules of steps, orders the
//! modules by their dependencies and converges the machine one step at a
//! time, skipping anything already in place.
//!
//! The public API is organised into these layers:
//!
//! - **[`config`]**: load, merge and validate documents; select a device
//! - **[`template`]**: render per-device files
//! - **[`steps`]**: idempotent `check + apply` primitives (packages, preferences, …)
//! - **[`modules`]**: the module registry, catalog and execution planner
//! - **[`runner`]**: execute a plan, isolating failures per module
//! - **[`report`]**: per-step results, counts and the run outcome
//! - **[`commands`]**: top-level subcommand orchestration (`apply`, `plan`, `validate`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

/// Release version, pinned by `PROVISION_VERSION` or taken from `git describe`.
pub const VERSION: &str = env!("PROVISION_VERSION");

/// Target triple the binary was built for.
pub const TARGET: &str = env!("PROVISION_TARGET");

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod modules;
pub mod platform;
pub mod privilege;
pub mod report;
pub mod runner;
pub mod steps;
pub mod template;
