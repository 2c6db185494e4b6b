//! memcore: allocator-aware containers and ownership primitives.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a small foundation layer where every allocation goes through an
//!   explicit, swappable allocator and every container states exactly
//!   when it constructs, copies and destroys elements.
//! - Layers:
//!   - `Allocator` / `AllocRef`: tagged raw allocation, a process-wide
//!     default behind a lock, and a tracking wrapper for leak checks.
//!   - `ElementOps`: the construct/destruct/copy strategy for a slot
//!     type. `Trivial` zero-fills plain-old-data; `NonTrivial` runs
//!     `Default`, `Clone` and `Drop`.
//!   - `Buffer<T, O>`: one allocation of `len` constructed elements,
//!     resized by building a new allocation and swapping.
//!   - `HashMap<K, V, H, MAX_OCCUPANCY>`: open addressing with linear
//!     probing over a `Buffer`; a `KeyHasher` policy supplies the
//!     sentinel key, so deletion shifts entries back instead of leaving
//!     tombstones.
//!   - Pointers: `IntrusivePtr` (count in the pointee), `SharedPtr`
//!     (count in a separate block, unsized pointees) and the
//!     `GcPtr`/`GcRef` pair (unique owner, weak views, `Collector`
//!     callbacks).
//!
//! Constraints
//! - Allocation failure is fatal; it never surfaces as a value.
//! - Contract violations (bad index, non-power-of-two capacity, sentinel
//!   keys, releasing shared ownership) panic. The `try_*` variants report
//!   the recoverable ones as [`Error`].
//! - Containers are `Send` when their contents are and are never shared
//!   mutably; wrap them in a lock to share.
//! - Pointer families are thread-safe only with an atomic counter.
//!
//! Reentrancy policy
//! - The hash map calls into user code only through its `KeyHasher`
//!   while probing, shifting or rehashing. A debug-only guard panics if
//!   the policy re-enters the same map during those sections.
//!
//! Logging
//! - `tracing` events: `info` when the default allocator is replaced,
//!   `debug` on hash map growth and resizing, `trace` on buffer
//!   replacement, `error` just before aborting on allocation failure. No
//!   subscriber is installed here.

pub mod allocator;
pub mod buffer;
mod cast;
pub mod counter;
pub mod element;
mod error;
pub mod gc;
pub mod global;
pub mod hash_map;
mod hash_map_proptest;
pub mod intrusive;
pub mod key_hasher;
pub mod owned;
mod reentrancy;
pub mod shared;

// Public surface
pub use allocator::{AllocRef, AllocTag, Allocator, SystemAllocator, TrackingAllocator};
pub use buffer::Buffer;
pub use cast::StaticCast;
pub use counter::{AtomicCount, Count, UsizeCount};
pub use element::{ElementOps, NonTrivial, Pod, Trivial};
pub use error::{Error, Result};
pub use gc::{Collector, DropCollector, GcPtr, GcRef, GcStaticPtr};
pub use hash_map::{HashMap, Iter, IterMut, Pair};
pub use intrusive::{Intrusive, IntrusivePtr};
pub use key_hasher::{IntHasher, KeyHasher, StrHasher};
pub use owned::{DefaultDeleter, Deleter, Owned};
pub use shared::SharedPtr;
