//! Debug-only reentrancy guard for hash map probing.
//!
//! Probing is the only place a map calls into user code (its
//! [`KeyHasher`](crate::KeyHasher) policy) while slots may be mid-shift. In
//! debug builds, entering a guarded section twice panics; in release builds
//! the guard compiles to nothing.

use core::cell::Cell;
use core::marker::PhantomData;

/// Per-map tracker; guard sections with `let _g = self.reentrancy.enter();`.
///
/// `Send` but never `Sync` in any build profile, so a guarded map can move
/// between threads (or behind a lock) but is never shared by reference.
#[derive(Debug, Default)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    _not_sync: PhantomData<Cell<()>>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _not_sync: PhantomData,
        }
    }

    /// Enter a guarded section. In debug builds, panics if already entered.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrancy detected: hasher policy re-entered the map during probing"
            );
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard { _owner: PhantomData }
        }
    }
}

// Cloned maps start outside any guarded section.
impl Clone for DebugReentrancy {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`DebugReentrancy::enter`].
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a DebugReentrancy>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        self.owner.busy.set(false);
    }
}
