//! Reference counters shared by the intrusive and shared pointer families.
//!
//! The counter type is the per-pointee customisation point: a
//! [`UsizeCount`] keeps sharing on one thread, an [`AtomicCount`] makes it
//! safe across threads.

use core::cell::Cell;
use core::sync::atomic::{self, AtomicUsize, Ordering};

/// A source of counted references.
pub trait Count: Default {
    /// Acquire one counted reference.
    fn get(&self);

    /// Release one counted reference.
    /// Returns true if the count is now zero.
    fn put(&self) -> bool;

    /// Current number of references.
    fn count(&self) -> usize;
}

/// Single-threaded reference counter.
#[derive(Debug, Default)]
pub struct UsizeCount {
    count: Cell<usize>,
}

impl UsizeCount {
    pub fn new(initial: usize) -> Self {
        Self {
            count: Cell::new(initial),
        }
    }
}

impl Count for UsizeCount {
    #[inline]
    fn get(&self) {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Follow Rc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
    }

    #[inline]
    fn put(&self) -> bool {
        let c = self.count.get();
        assert!(c > 0, "UsizeCount underflow");
        self.count.set(c - 1);
        c == 1
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.get()
    }
}

/// Thread-safe reference counter with `Arc`-style orderings.
#[derive(Debug, Default)]
pub struct AtomicCount {
    count: AtomicUsize,
}

impl AtomicCount {
    pub const fn new(initial: usize) -> Self {
        Self {
            count: AtomicUsize::new(initial),
        }
    }
}

const MAX_REFCOUNT: usize = isize::MAX as usize;

impl Count for AtomicCount {
    #[inline]
    fn get(&self) {
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        if old > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    #[inline]
    fn put(&self) -> bool {
        let old = self.count.fetch_sub(1, Ordering::Release);
        assert!(old > 0, "AtomicCount underflow");
        if old != 1 {
            return false;
        }
        // Synchronize with every earlier release before the pointee dies.
        atomic::fence(Ordering::Acquire);
        true
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}
