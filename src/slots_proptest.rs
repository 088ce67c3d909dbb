#![cfg(test)]

// Property tests for KeyedSlots kept inside the crate so they do not
// require feature gates to reach the slot layer.

use crate::key::ResourceKey;
use crate::slots::{InsertError, KeyedSlots, Slot};
use proptest::prelude::*;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// names, the pool shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    FindOrInsert(usize, i32),
    Remove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    ExtractNegative,
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::FindOrInsert(i, v)),
            idx.clone().prop_map(Op::Remove),
            idx.clone().prop_map(Op::Find),
            prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(Op::Contains),
            (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            Just(Op::ExtractNegative),
            Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Property: state-machine equivalence against std::collections::HashMap.
// - Duplicate keys are rejected; `find_or_insert_with` runs its default only
//   when the key is absent.
// - `find`/`contains_key` parity and slot stability for live entries.
// - `remove(slot)` returns the owned pair matching the model and
//   invalidates the slot; stale slots never resolve.
// - `extract_if` removes exactly the matching entries.
// - `iter` yields each live entry exactly once; `len` tracks the model.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: KeyedSlots<i32> = KeyedSlots::new();
        let mut model: HashMap<ResourceKey, i32> = HashMap::new();
        let mut live: HashMap<ResourceKey, Slot> = HashMap::new();
        let mut stale: Vec<Slot> = Vec::new();
        let default_calls = Cell::new(0);

        for op in ops {
            match op {
                Op::Insert(i, v) => {
                    let k = ResourceKey::new(&pool[i]);
                    let already = model.contains_key(&k);
                    match sut.insert(k, v) {
                        Ok(s) => {
                            prop_assert!(!already, "insert must fail on duplicate");
                            prop_assert!(live.insert(k, s).is_none());
                            model.insert(k, v);
                        }
                        Err(InsertError::DuplicateKey) => {
                            prop_assert!(already, "duplicate error only when key exists");
                        }
                    }
                }
                Op::FindOrInsert(i, v) => {
                    let k = ResourceKey::new(&pool[i]);
                    let already = model.contains_key(&k);
                    let before = default_calls.get();
                    let s = sut.find_or_insert_with(k, || {
                        default_calls.set(default_calls.get() + 1);
                        v
                    });
                    if already {
                        prop_assert_eq!(default_calls.get(), before);
                        prop_assert_eq!(Some(&s), live.get(&k));
                    } else {
                        prop_assert_eq!(default_calls.get(), before + 1);
                        live.insert(k, s);
                        model.insert(k, v);
                    }
                }
                Op::Remove(i) => {
                    let k = ResourceKey::new(&pool[i]);
                    if let Some(s) = live.remove(&k) {
                        let (kk, vv) = sut.remove(s).expect("live slot removes");
                        prop_assert_eq!(kk, k);
                        prop_assert_eq!(Some(vv), model.remove(&k));
                        stale.push(s);
                    } else {
                        prop_assert!(sut.find(k).is_none());
                    }
                }
                Op::Find(i) => {
                    let k = ResourceKey::new(&pool[i]);
                    prop_assert_eq!(sut.find(k), live.get(&k).copied());
                }
                Op::Contains(name) => {
                    let k = ResourceKey::new(&name);
                    prop_assert_eq!(sut.contains_key(k), model.contains_key(&k));
                }
                Op::Mutate(i, d) => {
                    let k = ResourceKey::new(&pool[i]);
                    if let Some(&s) = live.get(&k) {
                        let v = sut.get_mut(s).expect("live slot resolves");
                        *v = v.wrapping_add(d);
                        let m = model.get_mut(&k).expect("present in model");
                        *m = m.wrapping_add(d);
                    }
                }
                Op::ExtractNegative => {
                    let removed = sut.extract_if(|_, v| *v < 0);
                    for (k, v) in removed {
                        prop_assert_eq!(model.remove(&k), Some(v));
                        stale.extend(live.remove(&k));
                    }
                    prop_assert!(model.values().all(|v| *v >= 0));
                }
                Op::Iterate => {
                    let seen: BTreeSet<ResourceKey> = sut.iter().map(|(_, k, _)| k).collect();
                    let expected: BTreeSet<ResourceKey> = model.keys().copied().collect();
                    prop_assert_eq!(seen, expected);
                    for (s, k, v) in sut.iter() {
                        prop_assert_eq!(live.get(&k), Some(&s));
                        prop_assert_eq!(model.get(&k), Some(v));
                    }
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            for s in &stale {
                prop_assert!(sut.get(*s).is_none(), "stale slot must not resolve");
            }
        }
    }
}

// Same machine, but every digest shares its low 57 bits so all entries land
// in one bucket group; equality must still go through the full key.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_clustered_digests(ids in proptest::collection::vec(0u64..128, 1..80)) {
        let mut sut: KeyedSlots<u64> = KeyedSlots::new();
        let mut model: HashMap<u64, Slot> = HashMap::new();
        for id in ids {
            let k = ResourceKey::from_digest(id << 57 | 0x5a5a);
            match model.get(&id) {
                Some(&s) => {
                    prop_assert_eq!(sut.remove(s), Some((k, id)));
                    model.remove(&id);
                }
                None => {
                    let s = sut.insert(k, id).expect("fresh key inserts");
                    model.insert(id, s);
                }
            }
            for (&id, &s) in &model {
                let k = ResourceKey::from_digest(id << 57 | 0x5a5a);
                prop_assert_eq!(sut.find(k), Some(s));
            }
        }
        prop_assert_eq!(sut.len(), model.len());
    }
}
