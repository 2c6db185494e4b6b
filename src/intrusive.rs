//! IntrusivePtr: shared ownership with the count stored in the pointee.
//!
//! The pointee embeds its own counter and exposes it through [`Intrusive`].
//! Choosing the counter type per pointee decides whether sharing may cross
//! threads: a [`UsizeCount`](crate::UsizeCount) keeps the pointee `!Sync`
//! and with it the pointer `!Send`.

use crate::allocator::AllocRef;
use crate::counter::Count;
use crate::global;
use crate::owned::{DefaultDeleter, Deleter, Owned};
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::NonNull;

/// A type that carries its own reference count.
///
/// A freshly constructed pointee must report a count of zero.
pub trait Intrusive {
    type Count: Count;

    fn ref_count(&self) -> &Self::Count;
}

pub struct IntrusivePtr<T: Intrusive, D: Deleter<T> = DefaultDeleter> {
    ptr: Option<NonNull<T>>,
    alloc: AllocRef,
    _marker: PhantomData<(T, fn() -> D)>,
}

impl<T: Intrusive> IntrusivePtr<T> {
    pub fn new(value: T) -> Self {
        Self::new_in(value, global::allocator())
    }

    pub fn new_in(value: T, alloc: AllocRef) -> Self {
        let (ptr, alloc) = Owned::new_in(value, alloc).into_raw();
        unsafe { Self::from_raw_in(ptr, alloc) }
    }
}

impl<T: Intrusive, D: Deleter<T>> IntrusivePtr<T, D> {
    pub fn null() -> Self {
        Self {
            ptr: None,
            alloc: global::system(),
            _marker: PhantomData,
        }
    }

    /// Adopts `ptr`, incrementing its embedded count.
    ///
    /// #   Safety
    ///
    /// -   `ptr` must stay valid while its count is non-zero, and `D` must
    ///     be able to delete it through `alloc` once the count drops to zero.
    pub unsafe fn from_raw_in(ptr: NonNull<T>, alloc: AllocRef) -> Self {
        ptr.as_ref().ref_count().get();
        Self {
            ptr: Some(ptr),
            alloc,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|p| unsafe { &*p.as_ptr() })
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Zero for a null pointer.
    pub fn ref_count(&self) -> usize {
        self.get().map_or(0, |t| t.ref_count().count())
    }

    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    pub fn allocator(&self) -> AllocRef {
        self.alloc
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.alloc, &mut other.alloc);
    }

    /// Releases this reference and leaves the pointer null.
    pub fn reset(&mut self) {
        let mut old = Self::null();
        self.swap(&mut old);
    }
}

impl<T: Intrusive, D: Deleter<T>> Clone for IntrusivePtr<T, D> {
    fn clone(&self) -> Self {
        if let Some(t) = self.get() {
            t.ref_count().get();
        }
        Self {
            ptr: self.ptr,
            alloc: self.alloc,
            _marker: PhantomData,
        }
    }

    // Take the new reference before releasing the old one, so assigning a
    // pointer to a clone of itself never frees the pointee.
    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        self.swap(&mut tmp);
    }
}

impl<T: Intrusive, D: Deleter<T>> Drop for IntrusivePtr<T, D> {
    fn drop(&mut self) {
        let Some(ptr) = self.ptr.take() else { return };
        if unsafe { ptr.as_ref() }.ref_count().put() {
            unsafe { D::delete(ptr, self.alloc) }
        }
    }
}

impl<T: Intrusive, D: Deleter<T>> Deref for IntrusivePtr<T, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(t) => t,
            None => panic!("dereferenced a null IntrusivePtr"),
        }
    }
}

impl<T: Intrusive, D: Deleter<T>> Default for IntrusivePtr<T, D> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Intrusive, D: Deleter<T>> PartialEq for IntrusivePtr<T, D> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: Intrusive, D: Deleter<T>> Eq for IntrusivePtr<T, D> {}

impl<T: Intrusive + fmt::Debug, D: Deleter<T>> fmt::Debug for IntrusivePtr<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntrusivePtr").field(&self.get()).finish()
    }
}

unsafe impl<T: Intrusive + Send + Sync, D: Deleter<T>> Send for IntrusivePtr<T, D> {}
unsafe impl<T: Intrusive + Send + Sync, D: Deleter<T>> Sync for IntrusivePtr<T, D> {}
