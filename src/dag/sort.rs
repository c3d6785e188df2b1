// src/dag/sort.rs

//! Stable, cycle-tolerant topological sort.
//!
//! Used both to keep each node's source list in evaluation order and to
//! order the scheduler's pending work items.
//!
//! The sort runs Kahn's algorithm over the *reverse* graph: an item becomes
//! ready once nothing left in the input depends on it, the ready set is
//! drained highest input position first, and the emitted sequence is
//! reversed once at the end. This keeps unrelated items in their input
//! order and makes the sort idempotent on an already sorted list.
//!
//! Cycles are not an error here. Items left over with unresolved edges are
//! appended after the acyclic portion in input order, so a cycle that slipped
//! past node validation degrades ordering but never liveness.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;

use tracing::warn;

/// Sort `items` so every item comes after the items it depends on.
///
/// `dependencies_of` returns the direct dependencies of an item; only
/// dependencies that are themselves present in `items` are considered.
pub fn sort<T, F, I>(items: Vec<T>, mut dependencies_of: F) -> Vec<T>
where
    T: Eq + Hash,
    F: FnMut(&T) -> I,
    I: IntoIterator<Item = T>,
{
    if items.len() < 2 {
        return items;
    }

    let deps: Vec<Vec<usize>> = {
        let index: HashMap<&T, usize> =
            items.iter().enumerate().map(|(i, item)| (item, i)).collect();

        items
            .iter()
            .map(|item| {
                let mut direct: Vec<usize> = dependencies_of(item)
                    .into_iter()
                    .filter_map(|dep| index.get(&dep).copied())
                    .collect();
                direct.sort_unstable();
                direct.dedup();
                direct
            })
            .collect()
    };

    let order = kahn_order(&deps);
    permute(items, order)
}

/// Relation-based variant of [`sort`].
///
/// `depends_on(a, b)` answers "must `a` come after `b`?". The relation is
/// evaluated for every ordered pair, so it should be cheap or short-circuit.
pub fn sort_by<T, F>(items: Vec<T>, mut depends_on: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> bool,
{
    let n = items.len();
    if n < 2 {
        return items;
    }

    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut direct = Vec::new();
        for j in 0..n {
            if i != j && depends_on(&items[i], &items[j]) {
                direct.push(j);
            }
        }
        deps.push(direct);
    }

    let order = kahn_order(&deps);
    permute(items, order)
}

/// Whether `item` can reach itself by following `dependencies_of`.
///
/// Breadth-first from the item's direct dependencies, so a self-loop is
/// reported as circular as well as longer cycles.
pub fn is_circular<T, F, I>(item: &T, mut dependencies_of: F) -> bool
where
    T: Eq + Hash + Clone,
    F: FnMut(&T) -> I,
    I: IntoIterator<Item = T>,
{
    let mut seen: HashSet<T> = HashSet::new();
    let mut queue: VecDeque<T> = dependencies_of(item).into_iter().collect();

    while let Some(next) = queue.pop_front() {
        if &next == item {
            return true;
        }
        if !seen.insert(next.clone()) {
            continue;
        }
        queue.extend(dependencies_of(&next));
    }

    false
}

/// Compute the output permutation for `deps[i]` = indices `i` depends on.
fn kahn_order(deps: &[Vec<usize>]) -> Vec<usize> {
    let n = deps.len();

    // Number of not-yet-emitted items that depend on each item.
    let mut dependents_left = vec![0usize; n];
    for direct in deps {
        for &j in direct {
            dependents_left[j] += 1;
        }
    }

    // Max-heap on input position: we emit the reversed order, so the item
    // latest in the input must come out first.
    let mut ready: BinaryHeap<usize> = (0..n).rev().filter(|&i| dependents_left[i] == 0).collect();

    let mut emitted = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    while let Some(i) = ready.pop() {
        emitted.push(i);
        placed[i] = true;
        for &j in &deps[i] {
            dependents_left[j] -= 1;
            if dependents_left[j] == 0 {
                ready.push(j);
            }
        }
    }

    emitted.reverse();

    if emitted.len() < n {
        let cyclic: Vec<usize> = (0..n).filter(|&i| !placed[i]).collect();
        warn!(
            cyclic = cyclic.len(),
            total = n,
            "cycle detected while sorting; appending cyclic items in input order"
        );
        emitted.extend(cyclic);
    }

    emitted
}

fn permute<T>(items: Vec<T>, order: Vec<usize>) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
