// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stable topological ordering of node groups
//!
//! Kahn's algorithm with the ready set ordered by declaration index, so
//! groups that do not constrain each other keep the order they were
//! declared in.

use std::collections::BTreeSet;

/// Order `0..dependencies.len()` so every index comes after its dependencies
///
/// `dependencies[i]` lists the indices `i` depends on. Ties are broken by
/// the smaller index. Returns the indices that could not be ordered when the
/// graph has a cycle, in ascending order.
pub fn stable_topological_order(dependencies: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let count = dependencies.len();
    let mut remaining: Vec<usize> = vec![0; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (index, deps) in dependencies.iter().enumerate() {
        let unique: BTreeSet<usize> = deps.iter().copied().filter(|d| *d < count).collect();
        remaining[index] = unique.len();
        for dep in unique {
            dependents[dep].push(index);
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|i| remaining[*i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == count {
        Ok(order)
    } else {
        Err((0..count).filter(|i| remaining[*i] > 0).collect())
    }
}
