//! Modules: named, dependency-ordered groups of steps.
pub mod catalog;
mod planner;
mod registry;

pub use planner::{ExecutionPlan, plan, plan_subset};
pub use registry::ModuleRegistry;

use crate::steps::Step;

/// A named group of steps that converges one concern of the system.
#[derive(Debug)]
pub struct Module {
    /// Unique id.
    pub id: String,
    /// Ids of modules that must run first.
    pub dependencies: Vec<String>,
    /// Steps, executed in order.
    pub steps: Vec<Box<dyn Step>>,
}

impl Module {
    /// Create a module.
    #[must_use]
    pub fn new(id: &str, dependencies: Vec<String>, steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            id: id.to_string(),
            dependencies,
            steps,
        }
    }
}
