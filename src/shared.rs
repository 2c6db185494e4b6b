//! SharedPtr: shared ownership with the count in a separate block.
//!
//! The pointee needs no cooperation, so `T` may be unsized: a
//! `SharedPtr<Concrete>` upcasts to a `SharedPtr<dyn Trait>` sharing the
//! same block through [`StaticCast`].
//!
//! With [`AtomicCount`](crate::AtomicCount) pointers may be cloned and
//! dropped on several threads. Keep at least one pointer alive on the
//! thread that fans clones out until the fan-out is done; the count alone
//! does not order a clone racing the final release.

use crate::allocator::{allocate_value, free_value, AllocRef, AllocTag};
use crate::cast::{safe_cast, StaticCast};
use crate::counter::{Count, UsizeCount};
use crate::error::{Error, Result};
use crate::global;
use crate::owned::{DefaultDeleter, Deleter, Owned};
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::NonNull;

/// Out-of-line counter block.
///
/// The pointee dies when `count` reaches zero; the block goes once both
/// counts are zero.
struct SharedCounter<C> {
    count: C,
    weak_count: C,
}

struct Inner<T: ?Sized, C> {
    object: NonNull<T>,
    counter: NonNull<SharedCounter<C>>,
}

impl<T: ?Sized, C> Clone for Inner<T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized, C> Copy for Inner<T, C> {}

impl<T: ?Sized, C> Inner<T, C> {
    fn counter(&self) -> &SharedCounter<C> {
        unsafe { self.counter.as_ref() }
    }
}

pub struct SharedPtr<T: ?Sized, C: Count = UsizeCount, D: Deleter<T> = DefaultDeleter> {
    inner: Option<Inner<T, C>>,
    alloc: AllocRef,
    _marker: PhantomData<(Box<T>, fn() -> D)>,
}

impl<T, C: Count> SharedPtr<T, C> {
    pub fn new(value: T) -> Self {
        Self::new_in(value, global::allocator())
    }

    /// Allocates both the pointee and the counter block from `alloc`.
    pub fn new_in(value: T, alloc: AllocRef) -> Self {
        let (ptr, alloc) = Owned::new_in(value, alloc).into_raw();
        unsafe { Self::from_raw_in(ptr, alloc) }
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> SharedPtr<T, C, D> {
    pub fn null() -> Self {
        Self {
            inner: None,
            alloc: global::system(),
            _marker: PhantomData,
        }
    }

    /// Takes ownership of `ptr` with a fresh counter block from `alloc`.
    ///
    /// Only pointers that statically cast to `T` are accepted, so one block
    /// never ends up counting an unrelated object.
    ///
    /// #   Safety
    ///
    /// -   `ptr` must not be owned by anything else, and `D` must be able
    ///     to delete it through `alloc`.
    pub unsafe fn from_raw_in<U>(ptr: NonNull<U>, alloc: AllocRef) -> Self
    where
        U: ?Sized + StaticCast<T>,
    {
        let counter = allocate_value(
            alloc,
            SharedCounter {
                count: C::default(),
                weak_count: C::default(),
            },
            AllocTag::Counter,
        );
        counter.as_ref().count.get();
        Self {
            inner: Some(Inner {
                object: safe_cast(ptr),
                counter,
            }),
            alloc,
            _marker: PhantomData,
        }
    }

    /// A new owner of the same pointee, viewed as `U`.
    pub fn upcast<U>(&self) -> SharedPtr<U, C, D>
    where
        T: StaticCast<U>,
        U: ?Sized,
        D: Deleter<U>,
    {
        let inner = self.inner.map(|i| {
            i.counter().count.get();
            Inner {
                object: safe_cast(i.object),
                counter: i.counter,
            }
        });
        SharedPtr {
            inner,
            alloc: self.alloc,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.inner.map(|i| unsafe { &*i.object.as_ptr() })
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.map(|i| i.object)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Number of owners; zero for a null pointer.
    pub fn use_count(&self) -> usize {
        self.inner.map_or(0, |i| i.counter().count.count())
    }

    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }

    pub fn allocator(&self) -> AllocRef {
        self.alloc
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.inner, &mut other.inner);
        mem::swap(&mut self.alloc, &mut other.alloc);
    }

    /// Releases this owner and leaves the pointer null.
    pub fn reset(&mut self) {
        let mut old = Self::null();
        self.swap(&mut old);
    }

    /// Gives up ownership of a uniquely owned pointee without deleting it.
    ///
    /// The counter block is freed; the caller becomes responsible for the
    /// returned pointer, which still belongs to [`allocator`](Self::allocator).
    /// A null pointer yields `Ok(None)`.
    pub fn try_remove_ownership(&mut self) -> Result<Option<NonNull<T>>> {
        let Some(inner) = self.inner else {
            return Ok(None);
        };
        let uses = self.use_count();
        if uses != 1 {
            return Err(Error::NotUnique(uses));
        }
        self.inner = None;
        unsafe {
            let counter = inner.counter();
            counter.count.put();
            if counter.weak_count.count() == 0 {
                free_value(self.alloc, inner.counter, AllocTag::Counter);
            }
        }
        Ok(Some(inner.object))
    }

    /// Like [`try_remove_ownership`](Self::try_remove_ownership), panicking
    /// when other owners exist.
    pub fn remove_ownership(&mut self) -> Option<NonNull<T>> {
        match self.try_remove_ownership() {
            Ok(ptr) => ptr,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> Clone for SharedPtr<T, C, D> {
    fn clone(&self) -> Self {
        if let Some(i) = self.inner {
            i.counter().count.get();
        }
        Self {
            inner: self.inner,
            alloc: self.alloc,
            _marker: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        self.swap(&mut tmp);
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> Drop for SharedPtr<T, C, D> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else { return };
        if !inner.counter().count.put() {
            return;
        }
        unsafe {
            D::delete(inner.object, self.alloc);
            if inner.counter().weak_count.count() == 0 {
                free_value(self.alloc, inner.counter, AllocTag::Counter);
            }
        }
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> Deref for SharedPtr<T, C, D> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(t) => t,
            None => panic!("dereferenced a null SharedPtr"),
        }
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> Default for SharedPtr<T, C, D> {
    fn default() -> Self {
        Self::null()
    }
}

// Pointer identity; views of one pointee through different casts of the
// same type compare equal.
impl<T: ?Sized, C: Count, D: Deleter<T>> PartialEq for SharedPtr<T, C, D> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr().map(NonNull::cast::<u8>) == other.as_ptr().map(NonNull::cast::<u8>)
    }
}

impl<T: ?Sized, C: Count, D: Deleter<T>> Eq for SharedPtr<T, C, D> {}

impl<T: ?Sized + fmt::Debug, C: Count, D: Deleter<T>> fmt::Debug for SharedPtr<T, C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedPtr").field(&self.get()).finish()
    }
}

unsafe impl<T: ?Sized + Send + Sync, C: Count + Send + Sync, D: Deleter<T>> Send for SharedPtr<T, C, D> {}
unsafe impl<T: ?Sized + Send + Sync, C: Count + Send + Sync, D: Deleter<T>> Sync for SharedPtr<T, C, D> {}
