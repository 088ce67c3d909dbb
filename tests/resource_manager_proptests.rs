use proptest::prelude::*;
use resource_manager::{Resource, ResourceDataState, ResourcePolicy, ResourceStore};
use std::cell::Cell;
use std::rc::Rc;

// Model handle operations on one store and check that every key's reference
// count equals the number of live handles, whatever the policy.
proptest! {
    #[test]
    fn prop_reference_count_matches_live_handles(
        keys in 1usize..=5,
        ops in proptest::collection::vec((0u8..=5u8, 0usize..100usize), 1..120),
    ) {
        let store: ResourceStore<usize> = ResourceStore::new();
        let mut live: Vec<Vec<Resource<usize>>> = std::iter::repeat_with(Vec::new).take(keys).collect();
        // Keys currently stored as reference-counted.
        let mut counted = vec![false; keys];

        for (op, raw_k) in ops {
            let k = raw_k % keys;
            let name = format!("k{k}");
            match op {
                // New handle from the store.
                0 => live[k].push(store.get(name.as_str())),
                // Clone an existing handle.
                1 => {
                    if let Some(r) = live[k].last() {
                        let c = r.clone();
                        live[k].push(c);
                    }
                }
                // Drop one handle.
                2 => {
                    live[k].pop();
                }
                // Move a handle around; the count must not change.
                3 => {
                    if let Some(r) = live[k].pop() {
                        let moved = r;
                        live[k].insert(0, moved);
                    }
                }
                // Store data with a reference-counted policy.
                4 => {
                    store.set(name.as_str(), k, ResourceDataState::Mutable, ResourcePolicy::ReferenceCounted);
                    counted[k] = !live[k].is_empty();
                }
                // Store data with a manual policy, then sweep.
                5 => {
                    store.set(name.as_str(), k, ResourceDataState::Mutable, ResourcePolicy::Manual);
                    counted[k] = false;
                    store.free();
                }
                _ => unreachable!(),
            }

            prop_assert_eq!(store.reference_count(name.as_str()), live[k].len());
            if counted[k] && live[k].is_empty() {
                prop_assert!(!store.contains(name.as_str()));
                counted[k] = false;
            }
            for r in &live[k] {
                if let Some(v) = r.value() {
                    prop_assert_eq!(*v, k);
                }
            }
        }

        for (k, handles) in live.iter().enumerate() {
            prop_assert_eq!(store.reference_count(format!("k{k}")), handles.len());
        }
        drop(live);
        store.free();
        prop_assert!(store.is_empty());
    }
}

// A payload that may hold a handle to another entry of the same store.
struct Link {
    _next: Option<Resource<Link>>,
    drops: Rc<Cell<usize>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

// Build a random forest of reference-counted entries where each entry may
// hold a handle to an earlier one; dropping the external handles in any
// order must evict every entry exactly once.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_cascading_eviction(
        parents in proptest::collection::vec(proptest::option::of(0usize..32), 1..32),
        order in proptest::collection::vec(any::<proptest::sample::Index>(), 32),
    ) {
        let store: ResourceStore<Link> = ResourceStore::new();
        let drops = Rc::new(Cell::new(0));
        let mut external: Vec<Resource<Link>> = Vec::new();

        for (i, parent) in parents.iter().enumerate() {
            let name = format!("n{i}");
            let handle = store.get(name.as_str());
            let next = parent.filter(|_| i > 0).map(|p| {
                let target = format!("n{}", p % i);
                store.get(target.as_str())
            });
            store.set(
                name.as_str(),
                Link { _next: next, drops: drops.clone() },
                ResourceDataState::Final,
                ResourcePolicy::ReferenceCounted,
            );
            external.push(handle);
        }
        prop_assert_eq!(store.count(), parents.len());

        for idx in order {
            if external.is_empty() {
                break;
            }
            let at = idx.index(external.len());
            drop(external.swap_remove(at));
        }
        drop(external);

        prop_assert_eq!(drops.get(), parents.len());
        prop_assert!(store.is_empty());
    }
}
