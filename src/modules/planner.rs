//! Dependency-ordered execution planning.

use std::collections::{BTreeMap, BTreeSet};

use super::ModuleRegistry;
use crate::error::PlanError;

/// Ordered module ids; every module appears after all of its dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    order: Vec<String>,
}

impl ExecutionPlan {
    /// Module ids in execution order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of planned modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Plan every registered module.
///
/// # Errors
///
/// Returns [`PlanError::MissingDependency`] or [`PlanError::Cycle`].
pub fn plan(registry: &ModuleRegistry) -> Result<ExecutionPlan, PlanError> {
    let selected: BTreeSet<&str> = registry.ids().collect();
    order(registry, &selected)
}

/// Plan the modules in `only` plus everything they transitively depend on.
///
/// The whole registry is validated first, so a cycle or dangling dependency
/// anywhere is rejected even when the selection avoids it.
///
/// # Errors
///
/// Returns [`PlanError::UnknownModule`] for ids not in the registry, and
/// otherwise as [`plan`].
pub fn plan_subset(registry: &ModuleRegistry, only: &[String]) -> Result<ExecutionPlan, PlanError> {
    let mut pending: Vec<&str> = Vec::new();
    for id in only {
        let module = registry
            .lookup(id)
            .map_err(|_| PlanError::UnknownModule(id.clone()))?;
        pending.push(&module.id);
    }
    let full = plan(registry)?;

    let mut selected: BTreeSet<&str> = BTreeSet::new();
    while let Some(id) = pending.pop() {
        if !selected.insert(id) {
            continue;
        }
        if let Ok(module) = registry.lookup(id) {
            pending.extend(module.dependencies.iter().map(String::as_str));
        }
    }

    // A dependency-closed subsequence of a topological order is still one.
    Ok(ExecutionPlan {
        order: full
            .order
            .into_iter()
            .filter(|id| selected.contains(id.as_str()))
            .collect(),
    })
}

fn order(registry: &ModuleRegistry, selected: &BTreeSet<&str>) -> Result<ExecutionPlan, PlanError> {
    let deps: BTreeMap<&str, Vec<&str>> = selected
        .iter()
        .filter_map(|&id| registry.lookup(id).ok())
        .map(|m| {
            (
                m.id.as_str(),
                m.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    for (&id, module_deps) in &deps {
        if let Some(missing) = module_deps.iter().find(|d| !registry.contains(d)) {
            return Err(PlanError::MissingDependency {
                module: id.to_string(),
                dependency: (*missing).to_string(),
            });
        }
    }

    detect_cycle(&deps)?;
    Ok(ExecutionPlan {
        order: topological_order(&deps),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search with a visiting marker; reports the first cycle found
/// as `a -> b -> a`.
fn detect_cycle(deps: &BTreeMap<&str, Vec<&str>>) -> Result<(), PlanError> {
    fn visit<'a>(
        id: &'a str,
        deps: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), PlanError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle: Vec<&str> = path.get(start..).unwrap_or_default().to_vec();
                cycle.push(id);
                return Err(PlanError::Cycle(cycle.join(" -> ")));
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        path.push(id);
        for dep in deps.get(id).into_iter().flatten() {
            visit(dep, deps, marks, path)?;
        }
        path.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    let mut path = Vec::new();
    for id in deps.keys() {
        visit(id, deps, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Kahn's algorithm over an acyclic graph; ties break by ascending id.
fn topological_order(deps: &BTreeMap<&str, Vec<&str>>) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> =
        deps.iter().map(|(&id, d)| (id, d.len())).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (&id, module_deps) in deps {
        for &dep in module_deps {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter_map(|(&id, &d)| (d == 0).then_some(id))
        .collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for &dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = in_degree.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }
    order
}
