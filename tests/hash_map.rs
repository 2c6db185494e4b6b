// HashMap integration suite.
//
// Each test documents what behavior is being verified and which
// invariants are assumed or asserted. The core invariants exercised:
// - Occupancy: after an insert, len * 100 < capacity * MAX_OCCUPANCY.
// - Capacity: always zero or a power of two; resize validates its input.
// - Lookup: every inserted key stays findable across growth, removal and
//   compaction.
// - Storage: every slot array and value is released through the map's
//   allocator.
use memcore::hash_map::DEFAULT_CAPACITY;
use memcore::{AllocTag, Error, HashMap, IntHasher, KeyHasher, StrHasher, SystemAllocator, TrackingAllocator};
use std::collections::BTreeMap;

// Test: growth schedule from the default capacity.
// Assumes: identity hashing of small integer keys.
// Verifies: nine inserts end at capacity 16 with len 9.
#[test]
fn nine_inserts_double_capacity_once() {
    let mut m: HashMap<u32, u32> = HashMap::new();
    assert_eq!(m.capacity(), DEFAULT_CAPACITY);
    for k in 1..=9 {
        assert_eq!(m.insert(k, k * k), None);
    }
    assert_eq!(m.capacity(), 16);
    assert_eq!(m.len(), 9);
    assert!((1..=9).all(|k| m.find(&k) == Some(&(k * k))));
}

// Test: removal in the middle of a collision cluster.
// Assumes: keys 0, 32, 64, 96 share ideal slot 0 at capacity 32.
// Verifies: the rest of the cluster stays reachable after each removal.
#[test]
fn cluster_survives_removals() {
    let mut m: HashMap<u64, &str> = HashMap::with_capacity(32);
    for (k, v) in [(0, "a"), (32, "b"), (64, "c"), (96, "d"), (1, "e")] {
        m.insert(k, v);
    }
    assert_eq!(m.capacity(), 32);
    assert_eq!(m.remove(&32), Some("b"));
    assert_eq!(m.find(&64), Some(&"c"));
    assert_eq!(m.find(&96), Some(&"d"));
    assert_eq!(m.find(&1), Some(&"e"));
    assert_eq!(m.remove(&0), Some("a"));
    assert_eq!(m.remove(&0), None);
    assert_eq!(m.len(), 3);
    let rest: BTreeMap<u64, &str> = m.iter().map(|(k, v)| (*k, *v)).collect();
    assert_eq!(rest, BTreeMap::from([(1, "e"), (64, "c"), (96, "d")]));
}

// Test: compaction after heavy removal.
// Assumes: the default 75% occupancy limit.
// Verifies: compact shrinks to the smallest valid capacity and is
// idempotent.
#[test]
fn compact_shrinks_and_is_idempotent() {
    let mut m: HashMap<u32, u32> = (0..1000).map(|k| (k, k)).collect();
    let removed = m.remove_if(|k, _| *k >= 10);
    assert_eq!(removed, 990);
    m.compact();
    assert_eq!(m.capacity(), 16);
    m.compact();
    assert_eq!(m.capacity(), 16);
    assert!((0..10).all(|k| m.contains_key(&k)));
}

// Test: explicit resize.
// Assumes: try_resize reports bad capacities; resize(0) deallocates.
// Verifies: errors carry the offending numbers and success keeps entries.
// Signed keys skip -1, the all-bits-set sentinel.
#[test]
fn resize_contract() {
    let mut m: HashMap<i64, i64> = HashMap::with_capacity(0);
    assert_eq!(m.capacity(), 0);
    m.extend((-3..3).map(|k| (k, -k)).filter(|&(k, _)| k != -1));
    m.insert(-4, 4);
    assert_eq!(m.try_resize(3), Err(Error::NotPowerOfTwo(3)));
    assert_eq!(
        m.try_resize(4),
        Err(Error::CapacityTooSmall { capacity: 4, count: 6 })
    );
    assert_eq!(m.try_resize(8), Ok(()));
    assert!((-4..3).filter(|&k| k != -1).all(|k| m.find(&k) == Some(&-k)));
    assert!(!m.contains_key(&-5));
    m.resize(0);
    assert!(m.is_empty());
    assert_eq!(m.capacity(), 0);
}

// Test: signed sentinel.
// Verifies: -1 is the reserved key for signed integers under IntHasher.
#[test]
#[should_panic(expected = "cannot insert the sentinel key")]
fn signed_minus_one_is_reserved() {
    let mut m: HashMap<i32, i32> = HashMap::new();
    m.insert(-2, 0);
    m.insert(-1, 0);
}

// Test: clear keeps storage.
// Verifies: len drops to zero, capacity is unchanged, keys are gone.
#[test]
fn clear_keeps_capacity() {
    let mut m: HashMap<u16, String> = HashMap::with_capacity(64);
    m.insert(4, "four".into());
    m.insert(5, "five".into());
    m.clear();
    assert_eq!((m.len(), m.capacity()), (0, 64));
    assert!(!m.contains_key(&4));
    assert_eq!(m.iter().count(), 0);
}

// Test: custom hasher policy.
// Assumes: a policy may map many keys to the same hash.
// Verifies: correctness does not depend on hash quality.
#[test]
fn constant_hash_policy_still_works() {
    #[derive(Clone, Default)]
    struct Constant;
    impl KeyHasher<u32> for Constant {
        fn hash(&self, _key: &u32) -> usize {
            5
        }
        fn invalidate(&self, key: &mut u32) {
            IntHasher.invalidate(key)
        }
        fn is_equal(&self, a: &u32, b: &u32) -> bool {
            a == b
        }
        fn is_valid(&self, key: &u32) -> bool {
            *key != u32::MAX
        }
    }

    let mut m: HashMap<u32, u32, Constant> = HashMap::new();
    for k in 0..40 {
        m.insert(k, k + 100);
    }
    for k in (0..40).step_by(3) {
        assert_eq!(m.remove(&k), Some(k + 100));
    }
    for k in 0..40 {
        assert_eq!(m.find(&k).copied(), (k % 3 != 0).then_some(k + 100));
    }
}

// Test: string keys through a BuildHasher policy.
// Verifies: lookup by equal but distinct slices.
#[test]
fn str_keys_compare_by_content() {
    let owned: Vec<String> = (0..50).map(|i| format!("key-{i}")).collect();
    let mut m: HashMap<&str, usize, StrHasher> = HashMap::new();
    for (i, s) in owned.iter().enumerate() {
        m.insert(s.as_str(), i);
    }
    let probe = String::from("key-17");
    assert_eq!(m.find(&probe.as_str()), Some(&17));
    assert_eq!(m.len(), 50);
}

// Test: allocator routing and leak freedom.
// Verifies: slot arrays are tagged HashMap and all storage is returned.
#[test]
fn storage_goes_through_the_map_allocator() {
    static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
    {
        let mut m: HashMap<u32, Vec<u32>> = HashMap::with_capacity_and_hasher_in(8, IntHasher, &TRACKER);
        for k in 0..64 {
            m.insert(k, vec![k; 4]);
        }
        assert_eq!(TRACKER.live_allocations(AllocTag::HashMap), 1);
        assert!(TRACKER.total_allocations(AllocTag::HashMap) > 1);
        let copy = m.clone();
        assert_eq!(copy.len(), 64);
        assert_eq!(TRACKER.live_allocations(AllocTag::HashMap), 2);
    }
    assert_eq!(TRACKER.total_live_bytes(), 0);
}

// Test: a map behind a mutex can be shared across threads.
// Verifies: HashMap is Send when its contents are.
#[test]
fn map_behind_a_lock() {
    use parking_lot::Mutex;
    use std::sync::Arc;

    let shared = Arc::new(Mutex::new(HashMap::<u64, u64>::new()));
    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for k in 0..100 {
                    shared.lock().insert(t * 1000 + k, k);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(shared.lock().len(), 400);
}
