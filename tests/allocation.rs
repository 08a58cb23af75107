//! Allocation failures of the fallible constructors.
//!
//! The global allocator of this test binary can be told to fail, on the current thread only, once a given number of
//! allocations went through.

use std::{
    alloc::{GlobalAlloc, Layout, System},
    cell::Cell,
    ptr,
    rc::Rc,
};

use endor_shared::{SharedError, SharedPtr, WeakPtr};

#[global_allocator]
static ALLOCATOR: FailingAllocator = FailingAllocator;

#[test]
fn try_from_box_control_block() {
    let drops = Rc::new(Cell::new(0));
    let payload = Box::new(Payload::new(&drops));

    let result = failing_after(0, || SharedPtr::try_from_box(Some(payload)));

    assert_eq!(Some(SharedError::MemoryExhausted), result.err());
    assert_eq!(1, drops.get());
}

#[test]
fn try_new_payload() {
    let drops = Rc::new(Cell::new(0));
    let payload = Payload::new(&drops);

    let result = failing_after(0, || SharedPtr::try_new(payload));

    assert_eq!(Some(SharedError::MemoryExhausted), result.err());
    assert_eq!(1, drops.get());
}

#[test]
fn try_new_control_block() {
    let drops = Rc::new(Cell::new(0));
    let payload = Payload::new(&drops);

    //  The payload is allocated first, then the control block.
    let result = failing_after(1, || SharedPtr::try_new(payload));

    assert_eq!(Some(SharedError::MemoryExhausted), result.err());
    assert_eq!(1, drops.get());
}

#[test]
fn try_reset_leaves_empty() {
    let previous = Rc::new(Cell::new(0));
    let drops = Rc::new(Cell::new(0));

    let mut shared = SharedPtr::new(Payload::new(&previous));
    let weak = SharedPtr::downgrade(&shared);
    let payload = Box::new(Payload::new(&drops));

    let result = failing_after(0, || SharedPtr::try_reset(&mut shared, Some(payload)));

    assert_eq!(Err(SharedError::MemoryExhausted), result);
    assert!(SharedPtr::is_empty(&shared));
    assert_eq!(1, previous.get());
    assert_eq!(1, drops.get());

    //  The previous payload was released regardless.
    assert!(WeakPtr::is_expired(&weak));
    assert_eq!(1, WeakPtr::observing_count(&weak));
}

#[test]
fn recovers_after_failure() {
    let drops = Rc::new(Cell::new(0));

    let result = failing_after(0, || SharedPtr::try_new(Payload::new(&drops)));

    assert!(result.is_err());

    let shared = SharedPtr::try_new(Payload::new(&drops)).expect("allocated");
    let weak = SharedPtr::downgrade(&shared);

    assert_eq!(1, SharedPtr::owning_count(&shared));
    assert_eq!(1, SharedPtr::observing_count(&shared));

    drop(shared);

    assert_eq!(2, drops.get());
    assert!(WeakPtr::is_expired(&weak));
}

//
//  Implementation
//

std::thread_local! {
    //  Number of allocations to let through before failing, if armed.
    static COUNTDOWN: Cell<Option<u32>> = const { Cell::new(None) };
}

//  Runs `fun` with the `allowed`-th next allocation of the current thread failing.
//
//  Panics if no allocation failed.
fn failing_after<R>(allowed: u32, fun: impl FnOnce() -> R) -> R {
    COUNTDOWN.with(|countdown| countdown.set(Some(allowed)));

    let result = fun();

    let armed = COUNTDOWN.with(|countdown| countdown.replace(None));

    assert_eq!(None, armed, "no allocation failed");

    result
}

//  Consumes one allocation of the countdown, returning whether it should fail.
fn should_fail() -> bool {
    COUNTDOWN
        .try_with(|countdown| match countdown.get() {
            None => false,
            Some(0) => {
                countdown.set(None);
                true
            }
            Some(n) => {
                countdown.set(Some(n - 1));
                false
            }
        })
        .unwrap_or(false)
}

struct FailingAllocator;

unsafe impl GlobalAlloc for FailingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }

        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

//  A payload which records its destruction.
struct Payload {
    _bytes: [u8; 48],
    drops: Rc<Cell<u32>>,
}

impl Payload {
    fn new(drops: &Rc<Cell<u32>>) -> Self {
        Self {
            _bytes: [0; 48],
            drops: drops.clone(),
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
