// Allocator integration suite.
//
// Kept in its own test binary: it swaps the process-wide default, which
// would otherwise redirect allocations made by concurrently running tests.
//
// Core invariants exercised:
// - Routing: plain constructors capture the default at construction time.
// - Stability: swapping the default never migrates existing containers.
// - Accounting: every tagged allocation is released through its producer.
use memcore::global;
use memcore::{
    AllocTag, Allocator, Buffer, GcPtr, HashMap, SharedPtr, SystemAllocator, TrackingAllocator, Trivial,
};
use std::alloc::Layout;

static TRACKER: TrackingAllocator<SystemAllocator> = TrackingAllocator::new(SystemAllocator);

#[test]
fn default_allocator_swap_routes_everything() {
    let before: Buffer<u32, Trivial> = Buffer::with_capacity(4);

    let previous = global::set_allocator(&TRACKER);
    assert!(std::ptr::addr_eq(previous, global::system()));
    {
        let mut buf: Buffer<u32, Trivial> = Buffer::with_capacity(8);
        let mut map: HashMap<u32, u32> = HashMap::new();
        map.insert(1, 2);
        let shared = SharedPtr::<u64>::new(5);
        let gc = GcPtr::new(String::from("gc"));

        assert_eq!(TRACKER.live_allocations(AllocTag::Buffer), 1);
        assert_eq!(TRACKER.live_allocations(AllocTag::HashMap), 1);
        assert_eq!(TRACKER.live_allocations(AllocTag::Object), 2);
        assert_eq!(TRACKER.live_allocations(AllocTag::Counter), 2);

        // Restoring the default must not affect containers built under it.
        global::set_allocator(previous);
        buf.resize(16);
        map.resize(64);
        assert_eq!(TRACKER.live_bytes(AllocTag::Buffer), 64);
        assert!(std::ptr::addr_eq(buf.allocator(), &TRACKER as &dyn Allocator));
        assert_eq!(*shared, 5);
        assert_eq!(gc.len(), 2);
    }
    assert_eq!(TRACKER.total_live_bytes(), 0);
    assert!(std::ptr::addr_eq(before.allocator(), global::system()));
}

#[test]
fn raw_allocator_interface() {
    let sys = SystemAllocator;
    let layout = Layout::from_size_align(24, 8).unwrap();
    unsafe {
        let p = sys.allocate(layout, AllocTag::User(7));
        assert!(!p.is_null());
        assert_eq!(p as usize % 8, 0);
        p.write_bytes(0xAB, 24);
        sys.deallocate(p, layout, AllocTag::User(7));
    }
}
