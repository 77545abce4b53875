//! Execution ordering over extractor dependencies.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::DefinitionError;

use super::extractor::ExtractorDescriptor;

/// Compute an execution order over `descriptors`.
///
/// Returns indices into `descriptors`. Every extractor appears after all of
/// its dependencies; among extractors ready at the same time, the one
/// registered first comes first. Resolution is all-or-nothing.
pub fn resolve_order(descriptors: &[&ExtractorDescriptor]) -> Result<Vec<usize>, DefinitionError> {
    let index = index_by_name(descriptors)?;

    // deps[i]: indices extractor i waits on, in declared order, deduplicated
    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for dependency in &descriptor.depends_on {
            if dependency == &descriptor.name {
                return Err(DefinitionError::SelfDependency {
                    extractor: descriptor.name.clone(),
                });
            }
            let &dep_idx = index
                .get(dependency.as_str())
                .ok_or_else(|| DefinitionError::UnknownDependency {
                    extractor: descriptor.name.clone(),
                    dependency: dependency.clone(),
                })?;
            if seen.insert(dep_idx) {
                resolved.push(dep_idx);
            }
        }
        deps.push(resolved);
    }

    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (node, node_deps) in deps.iter().enumerate() {
        for &dep in node_deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(descriptors.len());

    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &child in &dependents[node] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if order.len() != descriptors.len() {
        let members = find_cycle(&deps, &in_degree)
            .into_iter()
            .map(|i| descriptors[i].name.clone())
            .collect();
        return Err(DefinitionError::Cycle { members });
    }

    Ok(order)
}

fn index_by_name<'a>(
    descriptors: &[&'a ExtractorDescriptor],
) -> Result<HashMap<&'a str, usize>, DefinitionError> {
    let mut index = HashMap::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.iter().enumerate() {
        if index.insert(descriptor.name.as_str(), i).is_some() {
            return Err(DefinitionError::DuplicateExtractor {
                name: descriptor.name.clone(),
            });
        }
    }
    Ok(index)
}

/// Walk unresolved dependencies from the earliest blocked extractor until a
/// node repeats; the repeated stretch of the walk is a cycle.
///
/// Every blocked node still waits on at least one blocked dependency, so the
/// walk cannot dead-end.
fn find_cycle(deps: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let blocked = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..deps.len()).find(|&i| blocked(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|&&d| blocked(d)) else {
            return path;
        };
        if let Some(&at) = position.get(&next) {
            return path.split_off(at);
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
