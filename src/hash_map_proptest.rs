#![cfg(test)]

// Property tests for HashMap kept inside the crate so they can reach the
// probe-chain checker and slot-level helpers.

use crate::hash_map::{HashMap, DEFAULT_MAX_OCCUPANCY};
use crate::key_hasher::{IntHasher, StrHasher};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap as StdHashMap};

#[derive(Clone, Debug)]
enum Op {
    Insert(u32, i32),
    Remove(u32),
    Find(u32),
    Mutate(u32, i32),
    RemoveIf(u32),
    Resize(u32),
    Compact,
    Clear,
    Iterate,
}

// Keys are drawn from a small range of multiples so identity hashing piles
// them into long, wrapping probe chains.
fn arb_key() -> impl Strategy<Value = u32> {
    prop_oneof![0u32..16, (0u32..16).prop_map(|k| k * 8 + 7), (0u32..8).prop_map(|k| k * 64)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => arb_key().prop_map(Op::Remove),
        2 => arb_key().prop_map(Op::Find),
        1 => (arb_key(), any::<i32>()).prop_map(|(k, d)| Op::Mutate(k, d)),
        1 => (2u32..5).prop_map(Op::RemoveIf),
        1 => (0u32..8).prop_map(Op::Resize),
        1 => Just(Op::Compact),
        1 => Just(Op::Clear),
        1 => Just(Op::Iterate),
    ]
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - insert/remove/find return what the model returns;
// - capacity stays zero or a power of two, and inserts keep occupancy under the limit;
// - after every op the live slot count equals len and no probe chain has a hole;
// - iteration yields exactly the model's entries.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in proptest::collection::vec(arb_op(), 1..120)) {
        let mut sut: HashMap<u32, i32> = HashMap::with_capacity(0);
        let mut model: StdHashMap<u32, i32> = StdHashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let previous = model.insert(k, v);
                    prop_assert_eq!(sut.insert(k, v), previous);
                    // Overwrites never grow, even after an exact-fit resize.
                    if previous.is_none() {
                        prop_assert!(sut.len() * 100 < sut.capacity() * DEFAULT_MAX_OCCUPANCY);
                    }
                }
                Op::Remove(k) => {
                    prop_assert_eq!(sut.remove(&k), model.remove(&k));
                }
                Op::Find(k) => {
                    prop_assert_eq!(sut.find(&k), model.get(&k));
                    prop_assert_eq!(sut.contains_key(&k), model.contains_key(&k));
                }
                Op::Mutate(k, d) => {
                    if let Some(v) = sut.find_mut(&k) {
                        *v = v.wrapping_add(d);
                    }
                    if let Some(v) = model.get_mut(&k) {
                        *v = v.wrapping_add(d);
                    }
                }
                Op::RemoveIf(m) => {
                    let before = model.len();
                    model.retain(|k, _| k % m != 0);
                    let mut judged = Vec::new();
                    let removed = sut.remove_if(|k, _| {
                        judged.push(*k);
                        k % m == 0
                    });
                    prop_assert_eq!(removed, before - model.len());
                    // Every entry is judged exactly once.
                    judged.sort_unstable();
                    let distinct = judged.len();
                    judged.dedup();
                    prop_assert_eq!(judged.len(), distinct);
                    prop_assert_eq!(distinct, before);
                }
                Op::Resize(shift) => {
                    let target = 1usize << shift;
                    let res = sut.try_resize(target);
                    prop_assert_eq!(res.is_ok(), target >= model.len());
                }
                Op::Compact => {
                    sut.compact();
                    let capacity = sut.capacity();
                    sut.compact();
                    prop_assert_eq!(sut.capacity(), capacity);
                }
                Op::Clear => {
                    sut.clear();
                    model.clear();
                }
                Op::Iterate => {
                    let seen: BTreeMap<u32, i32> = sut.iter().map(|(k, v)| (*k, *v)).collect();
                    let expected: BTreeMap<u32, i32> = model.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(seen, expected);
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            sut.assert_invariants();
        }

        for (k, v) in &model {
            prop_assert_eq!(sut.find(k), Some(v));
        }
    }
}

// Property: removing a key never increases any remaining key's distance
// from its ideal slot, and leaves every other key findable.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_removal_never_lengthens_chains(
        keys in proptest::collection::btree_set(arb_key(), 1..20),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut sut: HashMap<u32, u32> = HashMap::with_capacity(8);
        for &k in &keys {
            sut.insert(k, k);
        }
        let keys: Vec<u32> = keys.into_iter().collect();
        let victim = keys[pick.index(keys.len())];
        let before: Vec<(u32, usize)> = keys
            .iter()
            .filter(|&&k| k != victim)
            .map(|&k| (k, sut.displacement(&k).unwrap()))
            .collect();

        prop_assert_eq!(sut.remove(&victim), Some(victim));
        prop_assert!(!sut.contains_key(&victim));
        for (k, d) in before {
            let after = sut.displacement(&k);
            prop_assert!(after.is_some(), "key {} lost after removing {}", k, victim);
            prop_assert!(after.unwrap_or(usize::MAX) <= d);
        }
        sut.assert_invariants();
    }
}

// Property: string keys hashed through a BuildHasher agree with the model
// under interleaved inserts and removals.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_str_keys(pool in proptest::collection::vec("[a-z]{1,4}", 1..24), removes in proptest::collection::vec(any::<prop::sample::Index>(), 0..12)) {
        let mut sut: HashMap<&str, usize, StrHasher> = HashMap::new();
        let mut model: StdHashMap<&str, usize> = StdHashMap::new();
        for (i, s) in pool.iter().enumerate() {
            prop_assert_eq!(sut.insert(s.as_str(), i), model.insert(s.as_str(), i));
        }
        for ix in removes {
            let s = pool[ix.index(pool.len())].as_str();
            prop_assert_eq!(sut.remove(&s), model.remove(&s));
        }
        prop_assert_eq!(sut.len(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(sut.find(k), Some(v));
        }
        sut.assert_invariants();
    }
}

#[test]
fn clustered_keys_survive_growth() {
    let mut sut: HashMap<u64, u64, IntHasher> = HashMap::with_capacity(8);
    for k in (0..200u64).map(|k| k * 1024) {
        sut.insert(k, k + 1);
    }
    assert!(sut.capacity().is_power_of_two());
    for k in (0..200u64).map(|k| k * 1024) {
        assert_eq!(sut.find(&k), Some(&(k + 1)));
    }
    sut.assert_invariants();
}
