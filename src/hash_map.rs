//! HashMap: open addressing over a power-of-two [`Buffer`].
//!
//! Keys live directly in the slot array. Empty slots hold the hasher
//! policy's sentinel key, so there are no tombstones: removal shifts the
//! rest of the probe chain back instead. Invariants kept by every method:
//!
//! - capacity is zero or a power of two;
//! - after an insert, `len * 100 < capacity * MAX_OCCUPANCY`;
//! - every slot between a key's ideal slot (`hash & (capacity - 1)`) and the
//!   slot holding it is occupied.

use crate::allocator::{AllocRef, AllocTag};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::global;
use crate::key_hasher::{IntHasher, KeyHasher};
use crate::reentrancy::DebugReentrancy;
use core::fmt;
use core::mem;

/// Capacity allocated by [`HashMap::new`] and by the first insert into a
/// map created with capacity zero.
pub const DEFAULT_CAPACITY: usize = 8;

/// Default maximum occupancy, in percent.
pub const DEFAULT_MAX_OCCUPANCY: usize = 75;

/// A key/value record; identified only by its slot.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Pair<K, V> {
    pub key: K,
    pub value: V,
}

/// Open-addressing map with linear probing and backward-shift deletion.
///
/// `H` supplies hashing, equality and the sentinel key that marks empty
/// slots; `MAX_OCCUPANCY` is the load limit in percent.
pub struct HashMap<K, V, H = IntHasher, const MAX_OCCUPANCY: usize = DEFAULT_MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
{
    slots: Buffer<Pair<K, V>>,
    count: usize,
    hasher: H,
    reentrancy: DebugReentrancy,
}

enum Probe {
    Found(usize),
    Vacant(usize),
    Full,
}

impl<K, V, H, const MAX_OCCUPANCY: usize> HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K>,
{
    const OCCUPANCY_IN_RANGE: () = assert!(
        MAX_OCCUPANCY > 0 && MAX_OCCUPANCY <= 100,
        "MAX_OCCUPANCY must be a percentage in 1..=100"
    );

    /// Map with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self
    where
        H: Default,
    {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, H::default())
    }

    /// `capacity` must be zero or a power of two; zero defers allocation to
    /// the first insert.
    pub fn with_capacity(capacity: usize) -> Self
    where
        H: Default,
    {
        Self::with_capacity_and_hasher(capacity, H::default())
    }

    pub fn with_hasher(hasher: H) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_CAPACITY, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self::with_capacity_and_hasher_in(capacity, hasher, global::allocator())
    }

    pub fn with_capacity_and_hasher_in(capacity: usize, hasher: H, alloc: AllocRef) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::OCCUPANCY_IN_RANGE;
        assert!(
            capacity == 0 || capacity.is_power_of_two(),
            "{}",
            Error::NotPowerOfTwo(capacity)
        );
        let mut map = Self {
            slots: Buffer::with_tag(alloc, AllocTag::HashMap),
            count: 0,
            hasher,
            reentrancy: DebugReentrancy::new(),
        };
        if capacity > 0 {
            map.slots = map.fresh_slots(capacity);
        }
        map
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    pub fn allocator(&self) -> AllocRef {
        self.slots.allocator()
    }

    /// A slot array of `capacity` sentinel keys.
    fn fresh_slots(&self, capacity: usize) -> Buffer<Pair<K, V>> {
        let mut slots: Buffer<Pair<K, V>> =
            Buffer::with_capacity_tagged(capacity, self.slots.allocator(), AllocTag::HashMap);
        for pair in slots.as_mut_slice() {
            self.hasher.invalidate(&mut pair.key);
        }
        slots
    }

    #[inline]
    fn would_breach(&self, count: usize) -> bool {
        count * 100 >= self.capacity() * MAX_OCCUPANCY
    }

    /// Walks the probe chain of `key` until it finds the key or a sentinel.
    fn probe(&self, key: &K) -> Probe {
        let _g = self.reentrancy.enter();
        let capacity = self.capacity();
        if capacity == 0 {
            return Probe::Full;
        }
        let mask = capacity - 1;
        let mut i = self.hasher.hash(key) & mask;
        for _ in 0..capacity {
            let slot = &self.slots[i];
            if !self.hasher.is_valid(&slot.key) {
                return Probe::Vacant(i);
            }
            if self.hasher.is_equal(&slot.key, key) {
                return Probe::Found(i);
            }
            i = (i + 1) & mask;
        }
        Probe::Full
    }

    fn find_index(&self, key: &K) -> Option<usize> {
        assert!(self.hasher.is_valid(key), "cannot look up the sentinel key");
        match self.probe(key) {
            Probe::Found(i) => Some(i),
            Probe::Vacant(_) | Probe::Full => None,
        }
    }

    /// Inserts or overwrites; returns the previous value for `key`.
    ///
    /// Doubles the capacity first when storing a new key would breach the
    /// occupancy limit.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        assert!(self.hasher.is_valid(&key), "cannot insert the sentinel key");
        if self.capacity() == 0 {
            self.rehash(DEFAULT_CAPACITY);
        }
        loop {
            match self.probe(&key) {
                Probe::Found(i) => return Some(mem::replace(&mut self.slots[i].value, value)),
                Probe::Vacant(i) if !self.would_breach(self.count + 1) => {
                    self.slots[i] = Pair { key, value };
                    self.count += 1;
                    return None;
                }
                Probe::Vacant(_) | Probe::Full => {
                    let grown = self.capacity() * 2;
                    tracing::debug!(from = self.capacity(), to = grown, count = self.count, "growing hash map");
                    // Every probe position depends on the capacity; start over.
                    self.rehash(grown);
                }
            }
        }
    }

    pub fn find(&self, key: &K) -> Option<&V> {
        self.find_pair(key).map(|p| &p.value)
    }

    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let i = self.find_index(key)?;
        Some(&mut self.slots[i].value)
    }

    pub fn find_pair(&self, key: &K) -> Option<&Pair<K, V>> {
        self.find_index(key).map(|i| &self.slots[i])
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_index(key).is_some()
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let i = self.find_index(key)?;
        Some(self.remove_at(i).value)
    }

    /// Removes every entry for which `pred` returns true; returns how many.
    ///
    /// `pred` is called exactly once per entry.
    pub fn remove_if<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let capacity = self.capacity();
        if self.count == 0 {
            return 0;
        }
        let Some(start) = (0..capacity).find(|&i| !self.hasher.is_valid(&self.slots[i].key)) else {
            return self.remove_if_full(pred);
        };
        // Shifts stop at the sentinel in `start`, so an entry only ever moves
        // into the slot being scanned or one not yet reached.
        let mask = capacity - 1;
        let mut removed = 0;
        let mut step = 1;
        while step < capacity {
            let i = (start + step) & mask;
            let slot = &self.slots[i];
            if self.hasher.is_valid(&slot.key) && pred(&slot.key, &slot.value) {
                drop(self.remove_at(i));
                removed += 1;
                // Slot `i` may now hold a shifted entry; look at it again.
            } else {
                step += 1;
            }
        }
        removed
    }

    /// `remove_if` on a map with no sentinel to anchor the scan: judge every
    /// slot in place, then rebuild the chains at the same capacity.
    fn remove_if_full<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed = 0;
        for pair in self.slots.as_mut_slice() {
            if pred(&pair.key, &pair.value) {
                drop(mem::take(pair));
                self.hasher.invalidate(&mut pair.key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.count -= removed;
            self.rehash(self.capacity());
        }
        removed
    }

    /// Backward-shift deletion of the entry at `index`.
    ///
    /// Walks forward from the gap; each occupied neighbour whose ideal slot
    /// is no further from the gap than from its own slot moves into the gap,
    /// and its old slot becomes the gap. The walk ends at the first
    /// sentinel, and the final gap is invalidated.
    fn remove_at(&mut self, index: usize) -> Pair<K, V> {
        let removed = mem::take(&mut self.slots[index]);
        self.count -= 1;

        let capacity = self.capacity();
        let mask = capacity - 1;
        let _g = self.reentrancy.enter();
        let mut gap = index;
        let mut next = (index + 1) & mask;
        for _ in 1..capacity {
            if !self.hasher.is_valid(&self.slots[next].key) {
                break;
            }
            let ideal = self.hasher.hash(&self.slots[next].key) & mask;
            let to_gap = gap.wrapping_sub(ideal) & mask;
            let to_next = next.wrapping_sub(ideal) & mask;
            if to_next >= to_gap {
                self.slots[gap] = mem::take(&mut self.slots[next]);
                gap = next;
            }
            next = (next + 1) & mask;
        }
        self.hasher.invalidate(&mut self.slots[gap].key);
        removed
    }

    /// Removes every entry; keeps the capacity.
    pub fn clear(&mut self) {
        for pair in self.slots.as_mut_slice() {
            if self.hasher.is_valid(&pair.key) {
                pair.value = V::default();
                self.hasher.invalidate(&mut pair.key);
            }
        }
        self.count = 0;
    }

    /// Rehashes into exactly `capacity` slots.
    ///
    /// `capacity` must be a power of two not smaller than [`len`](Self::len);
    /// zero clears the map and releases its storage.
    pub fn try_resize(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            tracing::debug!(from = self.capacity(), count = self.count, "releasing hash map storage");
            self.slots = Buffer::with_tag(self.slots.allocator(), AllocTag::HashMap);
            self.count = 0;
            return Ok(());
        }
        if !capacity.is_power_of_two() {
            return Err(Error::NotPowerOfTwo(capacity));
        }
        if capacity < self.count {
            return Err(Error::CapacityTooSmall {
                capacity,
                count: self.count,
            });
        }
        tracing::debug!(from = self.capacity(), to = capacity, count = self.count, "resizing hash map");
        self.rehash(capacity);
        Ok(())
    }

    /// Like [`try_resize`](Self::try_resize), panicking on a bad capacity.
    pub fn resize(&mut self, capacity: usize) {
        if let Err(e) = self.try_resize(capacity) {
            panic!("{e}");
        }
    }

    /// Shrinks or grows to the smallest capacity that keeps the occupancy
    /// under the limit; zero when empty.
    pub fn compact(&mut self) {
        let target = Self::compact_capacity(self.count);
        if target != self.capacity() {
            self.resize(target);
        }
    }

    fn compact_capacity(count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut capacity = 1;
        while count * 100 >= capacity * MAX_OCCUPANCY {
            capacity <<= 1;
        }
        capacity
    }

    /// Moves every entry into a fresh slot array of `capacity` slots.
    fn rehash(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two() && capacity >= self.count);
        let mut old = self.fresh_slots(capacity);
        self.slots.swap(&mut old);

        let _g = self.reentrancy.enter();
        let mask = capacity - 1;
        for pair in old.as_mut_slice() {
            if !self.hasher.is_valid(&pair.key) {
                continue;
            }
            let mut i = self.hasher.hash(&pair.key) & mask;
            while self.hasher.is_valid(&self.slots[i].key) {
                i = (i + 1) & mask;
            }
            self.slots[i] = mem::take(pair);
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V, H> {
        Iter {
            slots: self.slots.as_slice().iter(),
            hasher: &self.hasher,
            remaining: self.count,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V, H> {
        IterMut {
            slots: self.slots.as_mut_slice().iter_mut(),
            hasher: &self.hasher,
            remaining: self.count,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

#[cfg(test)]
impl<K, V, H, const MAX_OCCUPANCY: usize> HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K>,
{
    /// Key stored in slot `index`, or `None` for a sentinel.
    pub(crate) fn slot_key(&self, index: usize) -> Option<&K> {
        let key = &self.slots[index].key;
        self.hasher.is_valid(key).then_some(key)
    }

    /// Distance from the ideal slot of `key` to the slot holding it.
    pub(crate) fn displacement(&self, key: &K) -> Option<usize> {
        let i = self.find_index(key)?;
        let mask = self.capacity() - 1;
        Some(i.wrapping_sub(self.hasher.hash(key) & mask) & mask)
    }

    /// Checks the structural invariants that hold after any operation.
    pub(crate) fn assert_invariants(&self) {
        let capacity = self.capacity();
        assert!(capacity == 0 || capacity.is_power_of_two());
        let live = self
            .slots
            .iter()
            .filter(|p| self.hasher.is_valid(&p.key))
            .count();
        assert_eq!(live, self.count, "count out of sync with slots");
        if capacity == 0 {
            return;
        }
        let mask = capacity - 1;
        for (i, pair) in self.slots.iter().enumerate() {
            if !self.hasher.is_valid(&pair.key) {
                continue;
            }
            let mut j = self.hasher.hash(&pair.key) & mask;
            while j != i {
                assert!(
                    self.hasher.is_valid(&self.slots[j].key),
                    "hole at slot {j} inside the probe chain ending at slot {i}"
                );
                j = (j + 1) & mask;
            }
        }
    }
}

impl<K, V, H, const MAX_OCCUPANCY: usize> Default for HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K> + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, H, const MAX_OCCUPANCY: usize> Clone for HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default + Clone,
    V: Default + Clone,
    H: Clone,
{
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            count: self.count,
            hasher: self.hasher.clone(),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

impl<K, V, H, const MAX_OCCUPANCY: usize> fmt::Debug for HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default + fmt::Debug,
    V: Default + fmt::Debug,
    H: KeyHasher<K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, H, const MAX_OCCUPANCY: usize> Extend<(K, V)> for HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, H, const MAX_OCCUPANCY: usize> FromIterator<(K, V)> for HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

/// Iterator over live entries in slot order.
pub struct Iter<'a, K, V, H> {
    slots: core::slice::Iter<'a, Pair<K, V>>,
    hasher: &'a H,
    remaining: usize,
}

impl<'a, K, V, H: KeyHasher<K>> Iterator for Iter<'a, K, V, H> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for pair in self.slots.by_ref() {
            if self.hasher.is_valid(&pair.key) {
                self.remaining -= 1;
                return Some((&pair.key, &pair.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, H: KeyHasher<K>> ExactSizeIterator for Iter<'_, K, V, H> {}

/// Iterator over live entries with mutable values.
pub struct IterMut<'a, K, V, H> {
    slots: core::slice::IterMut<'a, Pair<K, V>>,
    hasher: &'a H,
    remaining: usize,
}

impl<'a, K, V, H: KeyHasher<K>> Iterator for IterMut<'a, K, V, H> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for pair in self.slots.by_ref() {
            if self.hasher.is_valid(&pair.key) {
                self.remaining -= 1;
                return Some((&pair.key, &mut pair.value));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, H: KeyHasher<K>> ExactSizeIterator for IterMut<'_, K, V, H> {}

impl<'a, K, V, H, const MAX_OCCUPANCY: usize> IntoIterator for &'a HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K>,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, H>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, H, const MAX_OCCUPANCY: usize> IntoIterator for &'a mut HashMap<K, V, H, MAX_OCCUPANCY>
where
    K: Default,
    V: Default,
    H: KeyHasher<K>,
{
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V, H>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
