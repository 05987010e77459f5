//! Dependency resolution for deployment plans.

use std::{cmp::Reverse, collections::BinaryHeap};

use crate::{
    error::PlanError,
    plan::{ContractSpec, DeploymentPlan},
};

/// Order the contracts of `plan` so that every dependency precedes its
/// dependents.
///
/// Among contracts that do not depend on each other, the one inserted first
/// into the plan comes first, so the same plan always resolves to the same
/// order. Fails without returning a partial order if the plan is empty,
/// references an unknown contract or contains a cycle.
pub fn resolve(plan: &DeploymentPlan) -> Result<Vec<&ContractSpec>, PlanError> {
    if plan.is_empty() {
        return Err(PlanError::Empty);
    }

    let count = plan.len();
    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];

    for (index, spec) in plan.iter().enumerate() {
        for dependency in spec.depends_on() {
            let dep_index =
                plan.position(dependency)
                    .ok_or_else(|| PlanError::UnknownDependency {
                        contract: spec.name.clone(),
                        dependency: dependency.to_string(),
                    })?;
            dependencies[index].push(dep_index);
            dependents[dep_index].push(index);
            in_degree[index] += 1;
        }
    }

    // Kahn's algorithm with the ready set ordered by insertion index.
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(count);

    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < count {
        let members = find_cycle(&dependencies, &in_degree)
            .into_iter()
            .map(|index| plan[index].name.clone())
            .collect();
        return Err(PlanError::CyclicDependency { members });
    }

    let resolved: Vec<&ContractSpec> = order.into_iter().map(|index| &plan[index]).collect();
    tracing::debug!(
        order = ?resolved.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
        "Resolved deployment order"
    );
    Ok(resolved)
}

/// Extract one concrete cycle from the nodes Kahn's algorithm left behind.
///
/// Every leftover node still has a leftover dependency, so following
/// leftover dependencies from any leftover node must revisit a node. The
/// cycle is rotated to start at its earliest-inserted member.
fn find_cycle(dependencies: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let leftover = |index: usize| in_degree[index] > 0;

    let Some(start) = (0..in_degree.len()).find(|&index| leftover(index)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = dependencies[current].iter().find(|&&dep| leftover(dep)) else {
            return path;
        };
        if let Some(position) = path.iter().position(|&visited| visited == next) {
            let mut cycle = path.split_off(position);
            if let Some(first) = cycle
                .iter()
                .enumerate()
                .min_by_key(|(_, index)| **index)
                .map(|(position, _)| position)
            {
                cycle.rotate_left(first);
            }
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
