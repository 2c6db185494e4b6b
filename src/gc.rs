//! Collector-managed ownership: one owner, many weak views.
//!
//! A [`GcPtr`] uniquely owns its pointee. [`GcRef`]s observe it without
//! keeping it alive. Both talk to a [`Collector`], which decides what
//! "finalize" means:
//!
//! - dropping the owner hands the pointee to [`Collector::destroy`];
//! - dropping the last weak view while the owner lives calls
//!   [`Collector::collect`], the hook for deferred or pooled finalization.
//!
//! Owner and views share an out-of-line block whose `refs` field counts the
//! weak views plus one for a live owner, so whichever party brings it to
//! zero frees the block. The block header is type-erased, which lets a
//! `GcRef<dyn Trait>` release a block created for a concrete type.
//!
//! Weak views may be cloned and dropped on several threads when `T` is
//! `Send + Sync`. A collect callback may still be reading the pointee, so
//! do not drop the owner on one thread while the last view drops on
//! another.

use crate::allocator::{allocate_value, free_value, AllocRef, AllocTag};
use crate::cast::{safe_cast, StaticCast};
use crate::global;
use crate::owned::Owned;
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

/// Finalization policy for a [`GcPtr`] pointee.
pub trait Collector<T>: Send + Sync {
    /// The last weak view went away while the owner is still alive.
    fn collect(&self, object: &T);

    /// The owner went away; the pointee must be finalized.
    fn destroy(&self, object: Owned<T>);
}

/// Finalizes on destroy and ignores collect.
#[derive(Copy, Clone, Debug, Default)]
pub struct DropCollector;

impl<T> Collector<T> for DropCollector {
    fn collect(&self, _object: &T) {}

    fn destroy(&self, object: Owned<T>) {
        drop(object);
    }
}

struct GcVTable {
    collect: unsafe fn(NonNull<GcHeader>),
    free: unsafe fn(NonNull<GcHeader>),
}

#[repr(C)]
struct GcHeader {
    refs: AtomicUsize,
    // Null once the owner is gone.
    object: AtomicPtr<()>,
    vtable: &'static GcVTable,
}

#[repr(C)]
struct GcCounter<T: 'static> {
    header: GcHeader,
    collector: Option<Arc<dyn Collector<T>>>,
    alloc: AllocRef,
}

impl<T: 'static> GcCounter<T> {
    const VTABLE: &'static GcVTable = &GcVTable {
        collect: Self::collect_erased,
        free: Self::free_erased,
    };

    fn allocate(object: NonNull<T>, collector: Option<Arc<dyn Collector<T>>>, alloc: AllocRef) -> NonNull<Self> {
        allocate_value(
            alloc,
            Self {
                header: GcHeader {
                    refs: AtomicUsize::new(1),
                    object: AtomicPtr::new(object.as_ptr().cast()),
                    vtable: Self::VTABLE,
                },
                collector,
                alloc,
            },
            AllocTag::Counter,
        )
    }

    unsafe fn collect_erased(header: NonNull<GcHeader>) {
        let block = header.cast::<Self>().as_ref();
        let object = block.header.object.load(Ordering::Acquire).cast::<T>();
        if let (Some(collector), Some(object)) = (&block.collector, NonNull::new(object)) {
            collector.collect(object.as_ref());
        }
    }

    unsafe fn free_erased(header: NonNull<GcHeader>) {
        let block = header.cast::<Self>();
        let alloc = block.as_ref().alloc;
        free_value(alloc, block, AllocTag::Counter);
    }

    /// Drops the owner's reference; frees the block when no weak view is left.
    unsafe fn release_owner(block: NonNull<Self>) {
        if block.as_ref().header.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            Self::free_erased(block.cast());
        }
    }
}

/// Unique owner of a collector-managed pointee.
///
/// Not `Clone`; use [`take`](Self::take) to move ownership out of a place.
pub struct GcPtr<T: 'static> {
    block: Option<NonNull<GcCounter<T>>>,
    _owns: PhantomData<T>,
}

impl<T: 'static> GcPtr<T> {
    /// Owner without a collector: dropping it drops the pointee.
    pub fn new(value: T) -> Self {
        Self::from_parts(value, None, global::allocator())
    }

    pub fn new_in(value: T, alloc: AllocRef) -> Self {
        Self::from_parts(value, None, alloc)
    }

    pub fn create(value: T, collector: Arc<dyn Collector<T>>) -> Self {
        Self::from_parts(value, Some(collector), global::allocator())
    }

    pub fn create_in(value: T, collector: Arc<dyn Collector<T>>, alloc: AllocRef) -> Self {
        Self::from_parts(value, Some(collector), alloc)
    }

    fn from_parts(value: T, collector: Option<Arc<dyn Collector<T>>>, alloc: AllocRef) -> Self {
        let (object, alloc) = Owned::new_in(value, alloc).into_raw();
        Self {
            block: Some(GcCounter::allocate(object, collector, alloc)),
            _owns: PhantomData,
        }
    }

    pub fn null() -> Self {
        Self {
            block: None,
            _owns: PhantomData,
        }
    }

    fn parts(&self) -> Option<(NonNull<GcCounter<T>>, NonNull<T>)> {
        let block = self.block?;
        let object = unsafe { block.as_ref() }.header.object.load(Ordering::Acquire);
        NonNull::new(object.cast::<T>()).map(|o| (block, o))
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.parts().map(|(_, o)| unsafe { &*o.as_ptr() })
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.block.is_none()
    }

    /// Moves ownership out, leaving `self` null.
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    /// A weak view of the pointee; null for a null owner.
    pub fn downgrade(&self) -> GcRef<T> {
        GcRef::from_ptr(self)
    }

    /// Number of live weak views.
    pub fn weak_count(&self) -> usize {
        self.block
            .map_or(0, |b| unsafe { b.as_ref() }.header.refs.load(Ordering::Acquire) - 1)
    }
}

impl<T: 'static> Drop for GcPtr<T> {
    fn drop(&mut self) {
        let Some(block) = self.block.take() else { return };
        unsafe {
            let counter = block.as_ref();
            let object = counter.header.object.swap(ptr::null_mut(), Ordering::AcqRel);
            if let Some(object) = NonNull::new(object.cast::<T>()) {
                let owned = Owned::from_raw_in(object, counter.alloc);
                match &counter.collector {
                    Some(collector) => collector.destroy(owned),
                    None => drop(owned),
                }
            }
            GcCounter::release_owner(block);
        }
    }
}

impl<T: 'static> Deref for GcPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(t) => t,
            None => panic!("dereferenced a null GcPtr"),
        }
    }
}

impl<T: 'static> Default for GcPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for GcPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GcPtr").field(&self.get()).finish()
    }
}

unsafe impl<T: Send + Sync + 'static> Send for GcPtr<T> {}
unsafe impl<T: Send + Sync + 'static> Sync for GcPtr<T> {}

/// Owner for an instance the caller keeps elsewhere, e.g. on the stack.
///
/// Hands out [`GcRef`]s like a [`GcPtr`] but has no collector; dropping it
/// only detaches the weak views.
pub struct GcStaticPtr<'a, T: 'static> {
    object: &'a T,
    block: NonNull<GcCounter<T>>,
}

impl<'a, T: 'static> GcStaticPtr<'a, T> {
    pub fn new(object: &'a T) -> Self {
        Self::new_in(object, global::allocator())
    }

    pub fn new_in(object: &'a T, alloc: AllocRef) -> Self {
        Self {
            object,
            block: GcCounter::allocate(NonNull::from(object), None, alloc),
        }
    }

    pub fn get(&self) -> &'a T {
        self.object
    }

    pub fn downgrade(&self) -> GcRef<T> {
        GcRef::from_static(self)
    }

    pub fn weak_count(&self) -> usize {
        unsafe { self.block.as_ref() }.header.refs.load(Ordering::Acquire) - 1
    }
}

impl<T: 'static> Drop for GcStaticPtr<'_, T> {
    fn drop(&mut self) {
        unsafe {
            self.block
                .as_ref()
                .header
                .object
                .store(ptr::null_mut(), Ordering::Release);
            GcCounter::release_owner(self.block);
        }
    }
}

impl<T: 'static> Deref for GcStaticPtr<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.object
    }
}

struct WeakInner<T: ?Sized> {
    header: NonNull<GcHeader>,
    object: NonNull<T>,
}

impl<T: ?Sized> Clone for WeakInner<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for WeakInner<T> {}

impl<T: ?Sized> WeakInner<T> {
    fn header(&self) -> &GcHeader {
        unsafe { self.header.as_ref() }
    }
}

/// Weak, shareable view of a collector-managed pointee.
///
/// Views never keep the pointee alive; check [`is_alive`](Self::is_alive)
/// and access it through [`get`](Self::get).
pub struct GcRef<T: ?Sized> {
    inner: Option<WeakInner<T>>,
    _marker: PhantomData<*const T>,
}

impl<T: ?Sized> GcRef<T> {
    pub fn null() -> Self {
        Self {
            inner: None,
            _marker: PhantomData,
        }
    }

    fn attach(header: NonNull<GcHeader>, object: NonNull<T>) -> Self {
        unsafe { header.as_ref() }.refs.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Some(WeakInner { header, object }),
            _marker: PhantomData,
        }
    }

    /// A view of the pointee owned by `owner`, seen as `T`.
    pub fn from_ptr<U>(owner: &GcPtr<U>) -> Self
    where
        U: StaticCast<T> + 'static,
    {
        match owner.parts() {
            Some((block, object)) => Self::attach(block.cast(), safe_cast(object)),
            None => Self::null(),
        }
    }

    pub fn from_static<U>(owner: &GcStaticPtr<'_, U>) -> Self
    where
        U: StaticCast<T> + 'static,
    {
        Self::attach(owner.block.cast(), safe_cast(NonNull::from(owner.object)))
    }

    /// Another view of the same pointee, seen as `U`.
    pub fn upcast<U>(&self) -> GcRef<U>
    where
        T: StaticCast<U>,
        U: ?Sized,
    {
        match self.inner {
            Some(i) => GcRef::attach(i.header, safe_cast(i.object)),
            None => GcRef::null(),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// True while the owner holds the pointee.
    pub fn is_alive(&self) -> bool {
        self.inner
            .is_some_and(|i| !i.header().object.load(Ordering::Acquire).is_null())
    }

    /// The pointee, if still alive.
    ///
    /// #   Safety
    ///
    /// -   The owner must not be dropped while the returned reference is in
    ///     use.
    pub unsafe fn get(&self) -> Option<&T> {
        if self.is_alive() {
            self.inner.map(|i| &*i.object.as_ptr())
        } else {
            None
        }
    }

    fn live_header(&self) -> Option<NonNull<GcHeader>> {
        self.inner
            .filter(|i| !i.header().object.load(Ordering::Acquire).is_null())
            .map(|i| i.header)
    }
}

impl<T: ?Sized> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        match self.inner {
            Some(i) => Self::attach(i.header, i.object),
            None => Self::null(),
        }
    }
}

impl<T: ?Sized> Drop for GcRef<T> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else { return };
        let header = inner.header();
        let vtable = header.vtable;
        match header.refs.fetch_sub(1, Ordering::AcqRel) {
            // Owner already gone and this was the last view.
            1 => unsafe { (vtable.free)(inner.header) },
            // Last view while the owner lives.
            2 => unsafe { (vtable.collect)(inner.header) },
            _ => {}
        }
    }
}

impl<T: ?Sized> Default for GcRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

// Views of one block are equal, and so are any two views whose pointees
// are already destroyed.
impl<T: ?Sized> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        let same_block = self.inner.map(|i| i.header) == other.inner.map(|i| i.header);
        same_block || (self.live_header().is_none() && other.live_header().is_none())
    }
}

impl<T: ?Sized> Eq for GcRef<T> {}

impl<T: ?Sized> fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcRef")
            .field("null", &self.is_null())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl<T: ?Sized, U: StaticCast<T> + 'static> From<&GcPtr<U>> for GcRef<T> {
    fn from(owner: &GcPtr<U>) -> Self {
        Self::from_ptr(owner)
    }
}

impl<T: ?Sized, U: StaticCast<T> + 'static> From<&GcStaticPtr<'_, U>> for GcRef<T> {
    fn from(owner: &GcStaticPtr<'_, U>) -> Self {
        Self::from_static(owner)
    }
}

unsafe impl<T: ?Sized + Send + Sync> Send for GcRef<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for GcRef<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SystemAllocator, TrackingAllocator};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
    }

    impl Collector<String> for Journal {
        fn collect(&self, object: &String) {
            self.events.lock().push(format!("collect {object}"));
        }

        fn destroy(&self, object: Owned<String>) {
            self.events.lock().push(format!("destroy {}", *object));
        }
    }

    impl Journal {
        fn take(&self) -> Vec<String> {
            mem::take(&mut *self.events.lock())
        }
    }

    /// Invariant: the last weak view calls collect while the owner lives;
    /// the owner's drop always calls destroy.
    #[test]
    fn collect_then_destroy() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let journal = Arc::new(Journal::default());
        let owner = GcPtr::create_in("a".to_string(), journal.clone(), &TRACKER);
        let r1 = owner.downgrade();
        let r2 = r1.clone();
        assert_eq!(owner.weak_count(), 2);
        drop(r1);
        assert!(journal.take().is_empty());
        drop(r2);
        assert_eq!(journal.take(), ["collect a"]);
        drop(owner);
        assert_eq!(journal.take(), ["destroy a"]);
        assert_eq!(TRACKER.total_live_bytes(), 0);
    }

    /// Invariant: views outliving the owner observe destruction, and the
    /// last of them frees the block without calling collect.
    #[test]
    fn views_observe_owner_drop() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let journal = Arc::new(Journal::default());
        let owner = GcPtr::create_in("b".to_string(), journal.clone(), &TRACKER);
        let view = owner.downgrade();
        assert!(view.is_alive());
        assert_eq!(unsafe { view.get() }.map(String::as_str), Some("b"));
        drop(owner);
        assert_eq!(journal.take(), ["destroy b"]);
        assert!(!view.is_alive());
        assert!(unsafe { view.get() }.is_none());
        assert_eq!(TRACKER.live_allocations(AllocTag::Counter), 1);
        drop(view);
        assert!(journal.take().is_empty());
        assert_eq!(TRACKER.total_live_bytes(), 0);
    }

    /// Invariant: take moves ownership and leaves the source null.
    #[test]
    fn take_steals_ownership() {
        let mut a = GcPtr::new(5u32);
        let view = a.downgrade();
        let b = a.take();
        assert!(a.is_null());
        assert!(a.get().is_none());
        assert_eq!(*b, 5);
        assert!(view.is_alive());
        drop(a);
        assert!(view.is_alive());
        drop(b);
        assert!(!view.is_alive());
    }

    trait Speak {
        fn word(&self) -> &'static str;
    }

    struct Duck;

    impl Speak for Duck {
        fn word(&self) -> &'static str {
            "quack"
        }
    }

    crate::impl_static_cast!(Duck => dyn Speak);

    /// Invariant: upcast views share the concrete block and release it.
    #[test]
    fn upcast_views_share_block() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let owner = GcPtr::new_in(Duck, &TRACKER);
        let speak: GcRef<dyn Speak> = GcRef::from_ptr(&owner);
        let concrete = owner.downgrade();
        let again: GcRef<dyn Speak> = concrete.upcast();
        assert!(speak == again);
        assert_eq!(unsafe { speak.get() }.map(|s| s.word()), Some("quack"));
        drop(owner);
        drop((concrete, again));
        assert!(!speak.is_alive());
        drop(speak);
        assert_eq!(TRACKER.total_live_bytes(), 0);
    }

    /// Invariant: views of different blocks are equal only once both
    /// pointees are destroyed.
    #[test]
    fn equality_treats_dead_views_alike() {
        let a = GcPtr::new(1u8);
        let b = GcPtr::new(1u8);
        let ra = a.downgrade();
        let rb = b.downgrade();
        assert!(ra != rb);
        assert!(ra == ra.clone());
        drop(a);
        assert!(ra != rb);
        drop(b);
        assert!(ra == rb);
        assert!(ra == GcRef::null());
    }

    /// Invariant: a static owner hands out views and detaches them on drop
    /// without touching the borrowed instance.
    #[test]
    fn static_owner_detaches_views() {
        static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);
        let value = String::from("stack");
        let view = {
            let owner = GcStaticPtr::new_in(&value, &TRACKER);
            let view: GcRef<String> = (&owner).into();
            assert_eq!(owner.weak_count(), 1);
            assert_eq!(unsafe { view.get() }.map(String::as_str), Some("stack"));
            view
        };
        assert!(!view.is_alive());
        drop(view);
        assert_eq!(value, "stack");
        assert_eq!(TRACKER.total_live_bytes(), 0);
    }

    /// Invariant: views cloned and dropped on other threads leave the owner's
    /// count consistent and trigger exactly one collect.
    #[test]
    fn views_cross_threads() {
        #[derive(Default)]
        struct Counting(AtomicUsize);
        impl Collector<u64> for Counting {
            fn collect(&self, _object: &u64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn destroy(&self, object: Owned<u64>) {
                drop(object);
            }
        }

        let collector = Arc::new(Counting::default());
        let owner = GcPtr::create(7u64, collector.clone());
        let view = owner.downgrade();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let v = view.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let w = v.clone();
                        assert!(w.is_alive());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(owner.weak_count(), 1);
        assert_eq!(collector.0.load(Ordering::SeqCst), 0);
        drop(view);
        assert_eq!(collector.0.load(Ordering::SeqCst), 1);
    }
}
