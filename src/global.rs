//! Process-wide default allocator.
//!
//! Plain constructors (`Buffer::new`, `HashMap::new`, `SharedPtr::new`, ...)
//! read the default once and keep the returned [`AllocRef`]; replacing the
//! default later does not migrate existing containers. The `*_in`
//! constructors bypass the default entirely.

use crate::allocator::{AllocRef, SystemAllocator};
use parking_lot::RwLock;

static SYSTEM: SystemAllocator = SystemAllocator;

static CURRENT: RwLock<AllocRef> = parking_lot::const_rwlock(&SYSTEM);

/// Returns the current process-wide default allocator.
pub fn allocator() -> AllocRef {
    *CURRENT.read()
}

/// Installs `alloc` as the process-wide default and returns the previous one.
///
/// Memory already handed out keeps being released through the allocator
/// that produced it, so swapping is safe as long as the previous allocator
/// keeps working, which a `'static` reference guarantees for its lifetime.
pub fn set_allocator(alloc: AllocRef) -> AllocRef {
    let previous = core::mem::replace(&mut *CURRENT.write(), alloc);
    tracing::info!("process-wide default allocator replaced");
    previous
}

/// The allocator installed before any call to [`set_allocator`].
pub fn system() -> AllocRef {
    &SYSTEM
}
