//! Element construction strategies.
//!
//! Raw-memory containers need to know whether their elements carry
//! constructors and destructors. [`Trivial`] handles plain-old-data with
//! byte operations only; [`NonTrivial`] runs `Default`, `Clone` and `Drop`
//! for every element. The strategy is a type parameter, so the choice is
//! made by the type system and costs nothing at runtime.

use crate::allocator::{allocate_array, deallocate_array, AllocRef, AllocTag};
use core::ptr::{self, NonNull};

/// Plain-old-data marker.
///
/// #   Safety
///
/// The all-zero bit pattern must be a valid value of the type. `Copy`
/// already rules out drop glue.
pub unsafe trait Pod: Copy + 'static {}

macro_rules! impl_pod {
    ($($t:ty),* $(,)?) => { $( unsafe impl Pod for $t {} )* };
}

impl_pod!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, ());

unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

/// Construct/destroy/copy strategy for elements of type `T`.
pub trait ElementOps<T> {
    /// Initializes `count` slots of raw memory.
    ///
    /// #   Safety
    ///
    /// -   `ptr` must be valid for writes of `count` elements.
    unsafe fn construct(ptr: *mut T, count: usize);

    /// Ends the lifetime of `count` initialized elements.
    ///
    /// #   Safety
    ///
    /// -   `ptr` must point to `count` initialized elements that are not
    ///     used afterwards.
    unsafe fn destruct(ptr: *mut T, count: usize);

    /// Assigns `count` elements from `source` into the initialized
    /// elements at `target`.
    ///
    /// A null `source` with a non-zero `count` is a contract violation:
    /// asserted in debug builds, ignored in release builds.
    ///
    /// #   Safety
    ///
    /// -   Both ranges must hold `count` initialized elements and must not
    ///     overlap.
    unsafe fn copy(target: *mut T, source: *const T, count: usize)
    where
        T: Clone;

    /// Allocates and constructs `count` elements. Returns `None` for zero.
    fn create(alloc: AllocRef, count: usize, tag: AllocTag) -> Option<NonNull<T>> {
        if count == 0 {
            return None;
        }
        let ptr = allocate_array::<T>(alloc, count, tag);
        unsafe { Self::construct(ptr.as_ptr(), count) };
        Some(ptr)
    }

    /// Destructs `count` elements and releases the allocation.
    ///
    /// #   Safety
    ///
    /// -   `ptr` must come from `Self::create(alloc, count, tag)`.
    unsafe fn destroy(alloc: AllocRef, ptr: Option<NonNull<T>>, count: usize, tag: AllocTag) {
        if let Some(p) = ptr {
            debug_assert!(count > 0, "destroying a live allocation with zero elements");
            Self::destruct(p.as_ptr(), count);
            deallocate_array(alloc, p, count, tag);
        }
    }
}

/// Byte-level strategy for [`Pod`] elements.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Trivial;

/// Per-element strategy running `Default`, `Clone` and `Drop`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct NonTrivial;

impl<T: Pod> ElementOps<T> for Trivial {
    unsafe fn construct(ptr: *mut T, count: usize) {
        // Raw zero fill; no per-element work.
        ptr::write_bytes(ptr, 0, count);
    }

    unsafe fn destruct(_ptr: *mut T, _count: usize) {}

    unsafe fn copy(target: *mut T, source: *const T, count: usize)
    where
        T: Clone,
    {
        debug_assert!(!source.is_null() || count == 0, "copy from null source");
        if source.is_null() {
            return;
        }
        ptr::copy_nonoverlapping(source, target, count);
    }
}

impl<T: Default> ElementOps<T> for NonTrivial {
    unsafe fn construct(ptr: *mut T, count: usize) {
        // Reverse order mirrors destruction.
        for i in (0..count).rev() {
            ptr.add(i).write(T::default());
        }
    }

    unsafe fn destruct(ptr: *mut T, count: usize) {
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr, count));
    }

    unsafe fn copy(target: *mut T, source: *const T, count: usize)
    where
        T: Clone,
    {
        debug_assert!(!source.is_null() || count == 0, "copy from null source");
        if source.is_null() {
            return;
        }
        for i in 0..count {
            (*target.add(i)).clone_from(&*source.add(i));
        }
    }
}
