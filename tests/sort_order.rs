// tests/sort_order.rs

use std::collections::HashMap;

use nodeflow::dag::sort::{is_circular, sort, sort_by};

/// Item named by the letters it depends on, e.g. "ab" needs "a" and "b".
fn letter_deps(item: &&'static str) -> Vec<&'static str> {
    match *item {
        "abc" => vec!["a", "b", "c"],
        "ab" => vec!["a", "b"],
        _ => vec![],
    }
}

fn position(sorted: &[&str], item: &str) -> usize {
    sorted
        .iter()
        .position(|s| *s == item)
        .unwrap_or_else(|| panic!("{item} missing from {sorted:?}"))
}

#[test]
fn dependencies_come_first_and_unrelated_items_keep_input_order() {
    let sorted = sort(vec!["abc", "ab", "c", "b", "a"], letter_deps);

    assert_eq!(sorted, vec!["c", "b", "a", "abc", "ab"]);

    for leaf in ["a", "b", "c"] {
        assert!(position(&sorted, leaf) < position(&sorted, "abc"));
    }
    assert!(position(&sorted, "a") < position(&sorted, "ab"));
    assert!(position(&sorted, "b") < position(&sorted, "ab"));

    // Unrelated leaves stay in input order.
    assert!(position(&sorted, "c") < position(&sorted, "b"));
    assert!(position(&sorted, "b") < position(&sorted, "a"));
}

#[test]
fn sorting_a_sorted_list_is_a_no_op() {
    let once = sort(vec!["abc", "ab", "c", "b", "a"], letter_deps);
    let twice = sort(once.clone(), letter_deps);
    assert_eq!(once, twice);
}

#[test]
fn empty_and_single_inputs_pass_through() {
    let empty: Vec<&str> = sort(vec![], letter_deps);
    assert!(empty.is_empty());

    assert_eq!(sort(vec!["abc"], letter_deps), vec!["abc"]);
}

#[test]
fn dependencies_outside_the_input_are_ignored() {
    // "a" and "b" are not in the list, so "ab" and "abc" are unconstrained.
    let sorted = sort(vec!["abc", "c", "ab"], letter_deps);
    assert_eq!(sorted, vec!["c", "abc", "ab"]);
}

#[test]
fn sort_by_relation_matches_sort_by_dependencies() {
    let items = vec!["abc", "ab", "c", "b", "a"];
    let by_relation = sort_by(items.clone(), |a, b| letter_deps(a).contains(b));
    let by_deps = sort(items, letter_deps);
    assert_eq!(by_relation, by_deps);
}

#[test]
fn cycles_do_not_lose_or_duplicate_items() {
    // x -> y -> z -> x, and "free" depends on nothing.
    let deps: HashMap<&str, Vec<&str>> = HashMap::from([
        ("x", vec!["z"]),
        ("y", vec!["x"]),
        ("z", vec!["y"]),
        ("free", vec![]),
    ]);

    let sorted = sort(vec!["y", "free", "x", "z"], |item| deps[item].clone());

    let mut seen = sorted.clone();
    seen.sort_unstable();
    assert_eq!(seen, vec!["free", "x", "y", "z"]);
}

#[test]
fn items_depending_on_a_cycle_still_appear_exactly_once() {
    let deps: HashMap<&str, Vec<&str>> = HashMap::from([
        ("p", vec!["q"]),
        ("q", vec!["p"]),
        ("child", vec!["p"]),
        ("leaf", vec![]),
    ]);

    let sorted = sort(vec!["child", "p", "q", "leaf"], |item| deps[item].clone());

    let mut seen = sorted.clone();
    seen.sort_unstable();
    assert_eq!(seen, vec!["child", "leaf", "p", "q"]);
}

#[test]
fn three_cycle_is_circular_from_every_member() {
    let deps: HashMap<u32, Vec<u32>> =
        HashMap::from([(1, vec![2]), (2, vec![3]), (3, vec![1]), (4, vec![1])]);
    let lookup = |n: &u32| deps.get(n).cloned().unwrap_or_default();

    for member in [1, 2, 3] {
        assert!(is_circular(&member, lookup), "{member} should be circular");
    }
    // 4 reaches the cycle but is not part of it.
    assert!(!is_circular(&4, lookup));
}

#[test]
fn self_loop_is_circular() {
    assert!(is_circular(&"me", |_| vec!["me"]));
}

#[test]
fn acyclic_item_is_not_circular() {
    assert!(!is_circular(&"abc", letter_deps));
    assert!(!is_circular(&"a", letter_deps));
}
