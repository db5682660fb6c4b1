//! Interrupt-side ready set
//!
//! Interrupt handlers never touch the scheduler itself. They mark tasks as woken here, either
//! through a task's `Waker` or with `IrqReady::pend`, and the scheduler moves the marked tasks
//! to its ready queue at the top of every scheduling decision, inside a critical section, in
//! the order they were marked. Marking a task twice before the scheduler looks counts once.
//!
//! The set must be `'static` because wakers handed out to interrupt handlers can outlive any
//! borrow of the scheduler.

use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, Ordering},
    task::{RawWaker, RawWakerVTable, Waker},
};

use critical_section::Mutex;
use heapless::Deque;

use crate::TaskId;

struct Slot {
    index: u16,
    woken: AtomicBool,
    // marks this slot in the set that holds it
    mark: unsafe fn(*const Slot),
}

// NOTE `*const ()` is &'static Slot, inside a `&'static IrqReady<N>`
static VTABLE: RawWakerVTable = {
    unsafe fn clone(p: *const ()) -> RawWaker {
        RawWaker::new(p, &VTABLE)
    }
    unsafe fn wake(p: *const ()) {
        let slot = p as *const Slot;
        ((*slot).mark)(slot)
    }
    unsafe fn drop(_: *const ()) {
        // no-op
    }

    RawWakerVTable::new(clone, wake, wake, drop)
};

unsafe fn unset(_: *const Slot) {}

/// Tasks woken by interrupts, in the order the wake-ups arrived
#[repr(C)]
pub struct IrqReady<const N: usize> {
    // NOTE must stay the first field: a slot walks back to the set through its index
    slots: [Slot; N],
    // one entry per marked slot, so this never overflows
    order: Mutex<RefCell<Deque<u16, N>>>,
}

impl<const N: usize> IrqReady<N> {
    /// Creates a set with no task marked
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const CLEAR: Slot = Slot {
            index: 0,
            woken: AtomicBool::new(false),
            mark: unset,
        };
        let mut slots = [CLEAR; N];
        let mut i = 0;
        while i < N {
            slots[i].index = i as u16;
            slots[i].mark = Self::mark_slot;
            i += 1;
        }
        Self {
            slots,
            order: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    unsafe fn mark_slot(slot: *const Slot) {
        let index = usize::from((*slot).index);
        let set = &*(slot.sub(index) as *const Self);
        set.mark(index)
    }

    /// Marks `task` as woken by an interrupt
    ///
    /// The task only becomes ready if it is parked on the interrupt path (see `task::park` and
    /// the `sync` primitives); otherwise the mark is dropped at the next scheduling decision.
    pub fn pend(&self, task: TaskId) {
        self.mark(task.index())
    }

    fn mark(&self, task: usize) {
        let Some(slot) = self.slots.get(task) else {
            return;
        };
        critical_section::with(|cs| {
            // NOTE a load / store pair instead of `swap`: not every core has CAS, and the
            // critical section keeps other handlers out in between
            if !slot.woken.load(Ordering::Acquire) {
                slot.woken.store(true, Ordering::Release);
                self.order.borrow_ref_mut(cs).push_back(task as u16).ok();
            }
        })
    }

    pub(crate) fn waker(&'static self, task: usize) -> Waker {
        assert!(task < N);
        // NOTE(unsafe) derived from the whole set so `mark_slot` may step back to its start;
        // `slots` is the first field of a `repr(C)` struct
        unsafe {
            let slot = (self as *const Self as *const Slot).add(task);
            Waker::from_raw(RawWaker::new(slot as *const (), &VTABLE))
        }
    }

    /// Clears every mark, handing the marked slots to `f` in the order they were marked
    pub(crate) fn drain(&self, mut f: impl FnMut(usize)) {
        critical_section::with(|cs| {
            let mut order = self.order.borrow_ref_mut(cs);
            while let Some(task) = order.pop_front() {
                let task = usize::from(task);
                self.slots[task].woken.store(false, Ordering::Release);
                f(task);
            }
        })
    }

    /// Is any task marked?
    pub(crate) fn is_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.woken.load(Ordering::Acquire))
    }
}

impl<const N: usize> Default for IrqReady<N> {
    fn default() -> Self {
        Self::new()
    }
}
