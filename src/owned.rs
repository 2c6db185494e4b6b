//! Single-object allocations and deleters.

use crate::allocator::{allocate_value, free_value, AllocRef, AllocTag};
use crate::global;
use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

/// Uniquely owned object living in memory obtained from an [`AllocRef`].
///
/// This is the allocation every pointer family starts from, and the value a
/// [`Collector`](crate::gc::Collector) receives when an owner is destroyed.
pub struct Owned<T: ?Sized> {
    ptr: NonNull<T>,
    alloc: AllocRef,
    _owns: PhantomData<T>,
}

impl<T> Owned<T> {
    pub fn new(value: T) -> Self {
        Self::new_in(value, global::allocator())
    }

    pub fn new_in(value: T, alloc: AllocRef) -> Self {
        Self {
            ptr: allocate_value(alloc, value, AllocTag::Object),
            alloc,
            _owns: PhantomData,
        }
    }

    /// Moves the value out and releases the allocation.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        unsafe {
            let value = this.ptr.as_ptr().read();
            crate::allocator::deallocate_layout(
                this.alloc,
                this.ptr.cast(),
                core::alloc::Layout::new::<T>(),
                AllocTag::Object,
            );
            value
        }
    }
}

impl<T: ?Sized> Owned<T> {
    /// Takes back ownership of a pointer released by [`Owned::into_raw`].
    ///
    /// #   Safety
    ///
    /// -   `ptr` must come from `Owned::into_raw` of an `Owned` built with
    ///     `alloc`, possibly cast to a different pointee type through an
    ///     address-preserving cast, and must not be owned by anyone else.
    pub unsafe fn from_raw_in(ptr: NonNull<T>, alloc: AllocRef) -> Self {
        Self {
            ptr,
            alloc,
            _owns: PhantomData,
        }
    }

    /// Releases ownership without dropping; returns the pointer and the
    /// allocator that must eventually free it.
    pub fn into_raw(self) -> (NonNull<T>, AllocRef) {
        let this = ManuallyDrop::new(self);
        (this.ptr, this.alloc)
    }

    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }

    pub fn allocator(&self) -> AllocRef {
        self.alloc
    }
}

impl<T: ?Sized> Deref for Owned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ?Sized> DerefMut for Owned<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: ?Sized> Drop for Owned<T> {
    fn drop(&mut self) {
        unsafe { free_value(self.alloc, self.ptr, AllocTag::Object) }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

unsafe impl<T: ?Sized + Send> Send for Owned<T> {}
unsafe impl<T: ?Sized + Sync> Sync for Owned<T> {}

/// Disposes of a pointee once its last owner goes away.
pub trait Deleter<T: ?Sized> {
    /// #   Safety
    ///
    /// -   `ptr` is the pointee of the last owner and is not used afterwards.
    /// -   `alloc` is the allocator the owner was built with.
    unsafe fn delete(ptr: NonNull<T>, alloc: AllocRef);
}

/// Drops the pointee and frees it through the owner's allocator; the
/// counterpart of allocating with [`Owned`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DefaultDeleter;

impl<T: ?Sized> Deleter<T> for DefaultDeleter {
    unsafe fn delete(ptr: NonNull<T>, alloc: AllocRef) {
        drop(Owned::from_raw_in(ptr, alloc));
    }
}
