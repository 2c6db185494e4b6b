//! Buffer: a fixed-capacity array owning exactly one allocation.
//!
//! A buffer never reallocates in place. `reserve` and `resize` build a new
//! buffer, move the surviving prefix over, and [`Buffer::swap`] the two so
//! ownership only ever changes hands in one place. Every slot is always
//! initialized: constructed by `O` on creation, dropped by `O` on release.

use crate::allocator::{allocate_array, deallocate_array, AllocRef, AllocTag};
use crate::element::{ElementOps, NonTrivial, Pod, Trivial};
use crate::global;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};
use core::ptr::{self, NonNull};

/// Fixed-capacity array of `T` in one allocation from its [`AllocRef`].
///
/// `O` selects how elements are constructed, copied and destroyed.
pub struct Buffer<T, O: ElementOps<T> = NonTrivial> {
    // None iff capacity == 0.
    ptr: Option<NonNull<T>>,
    capacity: usize,
    alloc: AllocRef,
    tag: AllocTag,
    _owns: PhantomData<(T, O)>,
}

impl<T, O: ElementOps<T>> Buffer<T, O> {
    /// Empty buffer bound to the process-wide default allocator.
    pub fn new() -> Self {
        Self::new_in(global::allocator())
    }

    pub fn new_in(alloc: AllocRef) -> Self {
        Self::with_tag(alloc, AllocTag::Buffer)
    }

    pub(crate) fn with_tag(alloc: AllocRef, tag: AllocTag) -> Self {
        Self {
            ptr: None,
            capacity: 0,
            alloc,
            tag,
            _owns: PhantomData,
        }
    }

    /// Allocates `capacity` elements, constructed by `O`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, global::allocator())
    }

    pub fn with_capacity_in(capacity: usize, alloc: AllocRef) -> Self {
        Self::with_capacity_tagged(capacity, alloc, AllocTag::Buffer)
    }

    pub(crate) fn with_capacity_tagged(capacity: usize, alloc: AllocRef, tag: AllocTag) -> Self {
        let mut b = Self::with_tag(alloc, tag);
        b.ptr = O::create(alloc, capacity, tag);
        b.capacity = capacity;
        b
    }

    /// Allocates `src.len()` elements and copies `src` into them.
    pub fn from_slice(src: &[T]) -> Self
    where
        T: Clone,
    {
        Self::from_slice_in(src, global::allocator())
    }

    pub fn from_slice_in(src: &[T], alloc: AllocRef) -> Self
    where
        T: Clone,
    {
        Self::from_slice_tagged(src, alloc, AllocTag::Buffer)
    }

    fn from_slice_tagged(src: &[T], alloc: AllocRef, tag: AllocTag) -> Self
    where
        T: Clone,
    {
        let b = Self::with_capacity_tagged(src.len(), alloc, tag);
        if let Some(p) = b.ptr {
            unsafe { O::copy(p.as_ptr(), src.as_ptr(), src.len()) };
        }
        b
    }

    /// Capacity in elements; every one of them is initialized.
    #[inline]
    pub fn len(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.capacity == 0
    }

    pub fn byte_size(&self) -> usize {
        self.capacity * core::mem::size_of::<T>()
    }

    pub fn allocator(&self) -> AllocRef {
        self.alloc
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.map_or(ptr::null(), |p| p.as_ptr() as *const T)
    }

    pub fn as_slice(&self) -> &[T] {
        match self.ptr {
            Some(p) => unsafe { core::slice::from_raw_parts(p.as_ptr(), self.capacity) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.ptr {
            Some(p) => unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), self.capacity) },
            None => &mut [],
        }
    }

    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(index)
    }

    /// Exchanges storage with `other` without touching any element.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(&mut self.ptr, &mut other.ptr);
        core::mem::swap(&mut self.capacity, &mut other.capacity);
        core::mem::swap(&mut self.alloc, &mut other.alloc);
        core::mem::swap(&mut self.tag, &mut other.tag);
    }

    /// Grows to `capacity` if it exceeds the current one; otherwise a no-op.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.resize(capacity);
        }
    }

    /// Replaces the storage with exactly `capacity` elements.
    ///
    /// The first `min(capacity, len)` elements move over unchanged, new
    /// slots are constructed by `O`, truncated elements are destructed.
    pub fn resize(&mut self, capacity: usize) {
        tracing::trace!(from = self.capacity, to = capacity, "replacing buffer");
        let keep = self.capacity.min(capacity);
        let mut next = Self::with_tag(self.alloc, self.tag);
        if capacity > 0 {
            let dst = allocate_array::<T>(self.alloc, capacity, self.tag);
            unsafe {
                if let Some(src) = self.ptr {
                    ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), keep);
                }
                O::construct(dst.as_ptr().add(keep), capacity - keep);
            }
            next.ptr = Some(dst);
            next.capacity = capacity;
        }
        self.swap(&mut next);
        next.release_moved_prefix(keep);
    }

    /// Frees the storage after its first `moved` elements were moved out.
    fn release_moved_prefix(&mut self, moved: usize) {
        if let Some(p) = self.ptr.take() {
            unsafe {
                O::destruct(p.as_ptr().add(moved), self.capacity - moved);
                deallocate_array(self.alloc, p, self.capacity, self.tag);
            }
            self.capacity = 0;
        }
    }
}

impl<T: Pod> Buffer<T, Trivial> {
    /// Zero-fills every element.
    pub fn set_zero(&mut self) {
        if let Some(p) = self.ptr {
            unsafe { ptr::write_bytes(p.as_ptr(), 0, self.capacity) };
        }
    }
}

impl<T, O: ElementOps<T>> Drop for Buffer<T, O> {
    fn drop(&mut self) {
        unsafe { O::destroy(self.alloc, self.ptr.take(), self.capacity, self.tag) };
    }
}

impl<T, O: ElementOps<T>> Default for Buffer<T, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone, O: ElementOps<T>> Clone for Buffer<T, O> {
    fn clone(&self) -> Self {
        Self::from_slice_tagged(self.as_slice(), self.alloc, self.tag)
    }

    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        self.swap(&mut tmp);
    }
}

impl<T, O: ElementOps<T>> Index<usize> for Buffer<T, O> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.capacity,
            "index {index} out of bounds for buffer of length {}",
            self.capacity
        );
        unsafe { &*self.as_ptr().add(index) }
    }
}

impl<T, O: ElementOps<T>> IndexMut<usize> for Buffer<T, O> {
    /// Bounds-checked like [`Index`]; write-only callers on a possibly empty
    /// buffer should check [`Buffer::len`] or use [`Buffer::get_mut`].
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.capacity,
            "index {index} out of bounds for buffer of length {}",
            self.capacity
        );
        &mut self.as_mut_slice()[index]
    }
}

impl<T: fmt::Debug, O: ElementOps<T>> fmt::Debug for Buffer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<'a, T, O: ElementOps<T>> IntoIterator for &'a Buffer<T, O> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

unsafe impl<T: Send, O: ElementOps<T>> Send for Buffer<T, O> {}
unsafe impl<T: Sync, O: ElementOps<T>> Sync for Buffer<T, O> {}
