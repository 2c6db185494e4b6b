//! Allocator abstraction.
//!
//! Every container and pointer in this crate requests memory through an
//! [`Allocator`] tagged with the purpose of the allocation. The tag only
//! feeds instrumentation (see [`TrackingAllocator`]); it never changes
//! behavior.
//!
//! Allocation failure is fatal: an allocator may return null, and the crate
//! turns that into `std::alloc::handle_alloc_error` after logging it.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Purpose of an allocation, used for bucketing statistics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum AllocTag {
    General,
    Buffer,
    HashMap,
    Object,
    Counter,
    /// Embedder-defined purpose. All user tags share one bucket.
    User(u16),
}

impl AllocTag {
    /// Number of distinct buckets returned by [`AllocTag::index`].
    pub const COUNT: usize = 6;

    pub const fn index(self) -> usize {
        match self {
            AllocTag::General => 0,
            AllocTag::Buffer => 1,
            AllocTag::HashMap => 2,
            AllocTag::Object => 3,
            AllocTag::Counter => 4,
            AllocTag::User(_) => 5,
        }
    }
}

/// Raw memory provider.
pub trait Allocator: Send + Sync {
    /// Allocates memory as per the size and alignment of `layout`.
    ///
    /// May return a null pointer if the allocation cannot be satisfied.
    ///
    /// #   Safety
    ///
    /// -   Assumes that the size of `layout` is non-zero.
    unsafe fn allocate(&self, layout: Layout, tag: AllocTag) -> *mut u8;

    /// Deallocates memory.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `ptr` was allocated by `self.allocate` with the same
    ///     `layout` and `tag`, and was not already deallocated.
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout, tag: AllocTag);
}

/// Borrowed, non-owning allocator handle stored by containers and pointers.
pub type AllocRef = &'static dyn Allocator;

/// Allocator backed by the process global heap.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    unsafe fn allocate(&self, layout: Layout, _tag: AllocTag) -> *mut u8 {
        alloc::alloc(layout)
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout, _tag: AllocTag) {
        alloc::dealloc(ptr, layout)
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicUsize = AtomicUsize::new(0);

/// Wraps another allocator and keeps per-tag statistics of live memory.
///
/// Const-constructible so it can back a `static` and be installed as an
/// [`AllocRef`].
#[derive(Debug)]
pub struct TrackingAllocator<A> {
    inner: A,
    live_bytes: [AtomicUsize; AllocTag::COUNT],
    live_allocations: [AtomicUsize; AllocTag::COUNT],
    total_allocations: [AtomicUsize; AllocTag::COUNT],
}

impl<A> TrackingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            live_bytes: [ZERO; AllocTag::COUNT],
            live_allocations: [ZERO; AllocTag::COUNT],
            total_allocations: [ZERO; AllocTag::COUNT],
        }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Bytes currently allocated under `tag`.
    pub fn live_bytes(&self, tag: AllocTag) -> usize {
        self.live_bytes[tag.index()].load(Ordering::Relaxed)
    }

    /// Allocations currently outstanding under `tag`.
    pub fn live_allocations(&self, tag: AllocTag) -> usize {
        self.live_allocations[tag.index()].load(Ordering::Relaxed)
    }

    /// Allocations ever made under `tag`.
    pub fn total_allocations(&self, tag: AllocTag) -> usize {
        self.total_allocations[tag.index()].load(Ordering::Relaxed)
    }

    /// Bytes currently allocated across all tags.
    pub fn total_live_bytes(&self) -> usize {
        self.live_bytes
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum()
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    unsafe fn allocate(&self, layout: Layout, tag: AllocTag) -> *mut u8 {
        let ptr = self.inner.allocate(layout, tag);
        if !ptr.is_null() {
            let i = tag.index();
            self.live_bytes[i].fetch_add(layout.size(), Ordering::Relaxed);
            self.live_allocations[i].fetch_add(1, Ordering::Relaxed);
            self.total_allocations[i].fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout, tag: AllocTag) {
        let i = tag.index();
        self.live_bytes[i].fetch_sub(layout.size(), Ordering::Relaxed);
        self.live_allocations[i].fetch_sub(1, Ordering::Relaxed);
        self.inner.deallocate(ptr, layout, tag)
    }
}

/// Allocates `layout`, aborting the process if the allocator fails.
///
/// Zero-sized layouts never reach the allocator.
pub(crate) fn allocate_layout(alloc: AllocRef, layout: Layout, tag: AllocTag) -> NonNull<u8> {
    if layout.size() == 0 {
        // Aligned, non-null, never dereferenced for a zero-sized request.
        return unsafe { NonNull::new_unchecked(ptr::null_mut::<u8>().wrapping_add(layout.align())) };
    }
    let raw = unsafe { alloc.allocate(layout, tag) };
    match NonNull::new(raw) {
        Some(p) => p,
        None => {
            tracing::error!(size = layout.size(), align = layout.align(), ?tag, "allocation failed");
            alloc::handle_alloc_error(layout)
        }
    }
}

/// Releases memory obtained from [`allocate_layout`].
///
/// #   Safety
///
/// -   `ptr` must come from `allocate_layout(alloc, layout, tag)`.
pub(crate) unsafe fn deallocate_layout(alloc: AllocRef, ptr: NonNull<u8>, layout: Layout, tag: AllocTag) {
    if layout.size() != 0 {
        alloc.deallocate(ptr.as_ptr(), layout, tag);
    }
}

pub(crate) fn array_layout<T>(count: usize) -> Layout {
    match Layout::array::<T>(count) {
        Ok(layout) => layout,
        Err(_) => panic!("capacity overflow: {count} elements"),
    }
}

/// Allocates raw, uninitialized storage for `count` elements of `T`.
pub(crate) fn allocate_array<T>(alloc: AllocRef, count: usize, tag: AllocTag) -> NonNull<T> {
    allocate_layout(alloc, array_layout::<T>(count), tag).cast()
}

/// #   Safety
///
/// -   `ptr` must come from `allocate_array::<T>(alloc, count, tag)`; the
///     elements must already be destructed or moved out.
pub(crate) unsafe fn deallocate_array<T>(alloc: AllocRef, ptr: NonNull<T>, count: usize, tag: AllocTag) {
    deallocate_layout(alloc, ptr.cast(), array_layout::<T>(count), tag)
}

/// Moves `value` into a fresh allocation.
pub(crate) fn allocate_value<T>(alloc: AllocRef, value: T, tag: AllocTag) -> NonNull<T> {
    let ptr = allocate_layout(alloc, Layout::new::<T>(), tag).cast::<T>();
    unsafe { ptr.as_ptr().write(value) };
    ptr
}

/// Drops the value behind `ptr` and releases its allocation.
///
/// #   Safety
///
/// -   `ptr` must come from `allocate_value(alloc, _, tag)` (possibly
///     unsized afterwards through an address-preserving cast) and must not
///     be used again.
pub(crate) unsafe fn free_value<T: ?Sized>(alloc: AllocRef, ptr: NonNull<T>, tag: AllocTag) {
    let layout = Layout::for_value(ptr.as_ref());
    ptr::drop_in_place(ptr.as_ptr());
    deallocate_layout(alloc, ptr.cast(), layout, tag);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_buckets_are_distinct_except_user() {
        let tags = [
            AllocTag::General,
            AllocTag::Buffer,
            AllocTag::HashMap,
            AllocTag::Object,
            AllocTag::Counter,
            AllocTag::User(0),
        ];
        let mut seen = [false; AllocTag::COUNT];
        for t in tags {
            assert!(!seen[t.index()]);
            seen[t.index()] = true;
        }
        assert_eq!(AllocTag::User(1).index(), AllocTag::User(900).index());
    }

    #[test]
    fn tracking_counts_live_bytes_per_tag() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let p = allocate_array::<u64>(&TRACKER, 4, AllocTag::Buffer);
        assert_eq!(TRACKER.live_bytes(AllocTag::Buffer), 32);
        assert_eq!(TRACKER.live_allocations(AllocTag::Buffer), 1);
        assert_eq!(TRACKER.live_bytes(AllocTag::General), 0);
        unsafe { deallocate_array(&TRACKER, p, 4, AllocTag::Buffer) };
        assert_eq!(TRACKER.total_live_bytes(), 0);
        assert_eq!(TRACKER.total_allocations(AllocTag::Buffer), 1);
    }

    #[test]
    fn zero_sized_requests_skip_the_allocator() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let p = allocate_array::<u32>(&TRACKER, 0, AllocTag::Buffer);
        assert_eq!(p.as_ptr() as usize % core::mem::align_of::<u32>(), 0);
        assert_eq!(TRACKER.total_allocations(AllocTag::Buffer), 0);
        unsafe { deallocate_array(&TRACKER, p, 0, AllocTag::Buffer) };
    }

    #[test]
    fn values_round_trip_through_the_allocator() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let p = allocate_value(&TRACKER, String::from("kept"), AllocTag::Object);
        assert_eq!(unsafe { p.as_ref() }, "kept");
        assert_eq!(TRACKER.live_allocations(AllocTag::Object), 1);
        unsafe { free_value(&TRACKER, p, AllocTag::Object) };
        assert_eq!(TRACKER.live_allocations(AllocTag::Object), 0);
    }
}
