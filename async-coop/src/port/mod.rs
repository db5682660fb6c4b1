//! Platform services the scheduler consumes
//!
//! A port supplies the monotonic tick counter, a way to wait when no task is runnable and the
//! last-resort action taken on fatal errors. Suspending and resuming tasks needs no port
//! support: tasks are futures.

use crate::{error::Fatal, time::Ticks};

#[cfg(feature = "isa-cortex-m")]
pub mod cortex_m;
#[cfg(feature = "isa-riscv")]
pub mod riscv;
mod sim;
#[cfg(feature = "std")]
pub mod hosted;

pub use sim::SimPort;

/// Clock, idle and terminal action of a target
pub trait Port {
    /// Length of a second in ticks
    fn ticks_per_sec(&self) -> u32;

    /// Starts the tick source; called once when `Scheduler::run` starts
    fn init(&self) {}

    /// Current value of the free running tick counter
    fn now(&self) -> Ticks;

    /// Waits for up to `timeout` ticks, or until an interrupt arrives when `timeout` is `None`
    ///
    /// Returning early is allowed; the scheduler re-checks its queues every time this returns.
    fn idle(&self, timeout: Option<Ticks>);

    /// Terminal action for unrecoverable errors
    fn fatal(&self, error: &Fatal) -> ! {
        panic!("{}", error)
    }
}

impl<P> Port for &P
where
    P: Port + ?Sized,
{
    fn ticks_per_sec(&self) -> u32 {
        (**self).ticks_per_sec()
    }

    fn init(&self) {
        (**self).init()
    }

    fn now(&self) -> Ticks {
        (**self).now()
    }

    fn idle(&self, timeout: Option<Ticks>) {
        (**self).idle(timeout)
    }

    fn fatal(&self, error: &Fatal) -> ! {
        (**self).fatal(error)
    }
}

/// Tick counter advanced from a periodic timer interrupt
///
/// Shared by the bare-metal ports; the counter is only touched inside critical sections so it
/// also works on cores without atomic read-modify-write instructions.
#[cfg(any(feature = "isa-cortex-m", feature = "isa-riscv"))]
pub struct TickCounter {
    ticks: critical_section::Mutex<core::cell::Cell<Ticks>>,
}

#[cfg(any(feature = "isa-cortex-m", feature = "isa-riscv"))]
impl TickCounter {
    /// Creates a counter starting at zero
    pub const fn new() -> Self {
        Self {
            ticks: critical_section::Mutex::new(core::cell::Cell::new(0)),
        }
    }

    /// Advances the counter by one tick; call this from the periodic timer interrupt
    pub fn tick(&self) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        })
    }

    /// Current tick count
    pub fn now(&self) -> Ticks {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }
}
