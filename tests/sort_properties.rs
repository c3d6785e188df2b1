use std::collections::HashSet;

use nodeflow::dag::sort::sort;
use proptest::prelude::*;

// Acyclic by construction: item N may only depend on items 0..N-1.
fn dag_strategy(max_items: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_items).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..n), n).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, potential)| {
                        let deps: HashSet<usize> = if i == 0 {
                            HashSet::new()
                        } else {
                            potential.into_iter().map(|d| d % i).collect()
                        };
                        deps.into_iter().collect()
                    })
                    .collect()
            },
        )
    })
}

fn shuffled_dag(max_items: usize) -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    dag_strategy(max_items).prop_flat_map(|deps| {
        let order: Vec<usize> = (0..deps.len()).collect();
        (Just(deps), Just(order).prop_shuffle())
    })
}

fn respects_dependencies(sorted: &[usize], deps: &[Vec<usize>]) -> bool {
    let mut seen = HashSet::new();
    for item in sorted {
        if deps[*item].iter().any(|d| !seen.contains(d)) {
            return false;
        }
        seen.insert(*item);
    }
    true
}

proptest! {
    #[test]
    fn every_item_follows_its_dependencies((deps, input) in shuffled_dag(16)) {
        let sorted = sort(input.clone(), |i| deps[*i].clone());

        let mut a = sorted.clone();
        let mut b = input;
        a.sort_unstable();
        b.sort_unstable();
        prop_assert_eq!(a, b);

        prop_assert!(respects_dependencies(&sorted, &deps));
    }

    #[test]
    fn sort_is_idempotent((deps, input) in shuffled_dag(16)) {
        let once = sort(input, |i| deps[*i].clone());
        let twice = sort(once.clone(), |i| deps[*i].clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn valid_orders_are_left_untouched(deps in dag_strategy(16)) {
        // Identity order is valid because deps only point backwards.
        let input: Vec<usize> = (0..deps.len()).collect();
        let sorted = sort(input.clone(), |i| deps[*i].clone());
        prop_assert_eq!(sorted, input);
    }
}
