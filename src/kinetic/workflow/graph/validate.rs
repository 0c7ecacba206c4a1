// SPDX-License-Identifier: MIT

//! Definition validation - runs before a workflow is scheduled

use std::collections::{HashMap, HashSet, VecDeque};

use crate::adk::error::{KineticError, Result};
use crate::kinetic::workflow::types::WorkflowDefinition;

/// Reject malformed definitions, unresolved dependencies and cycles
pub fn validate_definition(def: &WorkflowDefinition) -> Result<()> {
    if def.id.trim().is_empty() {
        return Err(KineticError::validation("workflow id must not be empty"));
    }
    if def.steps.is_empty() {
        return Err(KineticError::validation(format!(
            "workflow '{}' declares no steps",
            def.id
        )));
    }

    let mut seen = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            return Err(KineticError::validation("step id must not be empty"));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(KineticError::validation(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
        if step.service.trim().is_empty() || step.endpoint.trim().is_empty() {
            return Err(KineticError::validation(format!(
                "step '{}' must name a service and an endpoint",
                step.id
            )));
        }
    }

    for step in &def.steps {
        for dep in step.depends_on.iter() {
            if !seen.contains(dep.as_str()) {
                log::warn!("Step {} depends on unknown step {}", step.id, dep);
                return Err(KineticError::Dependency {
                    pending: vec![step.id.clone()],
                });
            }
        }
    }

    topological_batches(def).map(|_| ())
}

/// Group steps into dependency levels (Kahn's algorithm).
///
/// Each batch contains only steps whose dependencies all sit in earlier
/// batches. Steps left over when no progress can be made form a cycle and
/// are reported as a dependency error.
pub fn topological_batches(def: &WorkflowDefinition) -> Result<Vec<Vec<String>>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in &def.steps {
        in_degree.entry(step.id.as_str()).or_insert(0);
        for dep in step.depends_on.iter() {
            *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(step.id.as_str());
        }
    }

    // Preserve declaration order inside each batch
    let mut queue: VecDeque<&str> = def
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut batches = Vec::new();
    let mut placed = 0usize;

    while !queue.is_empty() {
        let batch: Vec<&str> = queue.drain(..).collect();
        placed += batch.len();

        let mut next = Vec::new();
        for id in &batch {
            for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        next.sort_by_key(|id| def.steps.iter().position(|s| s.id == *id));
        queue.extend(next);

        batches.push(batch.into_iter().map(String::from).collect());
    }

    if placed < def.steps.len() {
        let pending: Vec<String> = def
            .steps
            .iter()
            .filter(|s| in_degree.get(s.id.as_str()).is_some_and(|d| *d > 0))
            .map(|s| s.id.clone())
            .collect();
        return Err(KineticError::Dependency { pending });
    }

    Ok(batches)
}
