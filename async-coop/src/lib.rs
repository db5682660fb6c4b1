//! Cooperative multitasking for targets without an operating system
//!
//! Tasks are futures that live in caller-provided `Stack` buffers; a `Scheduler` runs them one
//! at a time and switches only at `.await` points. Blocking operations (`task::sleep`,
//! `unsync::Mutex::lock`, `unsync::Channel::get`, ...) take the scheduler as their runtime
//! and return `Err(Cancelled)` if another task (or the dead-task scan) cancels the wait.
//!
//! ``` ignore
//! static IRQ: IrqReady<4> = IrqReady::new();
//!
//! let mut stack = Stack::<1024>::new();
//! let sched: FastScheduler<'_, _, 4> = Scheduler::new(port, &IRQ);
//! let sched = &sched;
//!
//! sched.spawn(&mut stack, async move {
//!     loop {
//!         task::sleep_ms(sched, 500).await.ok();
//!         led.toggle();
//!     }
//! })?;
//!
//! sched.run(async { /* main task */ });
//! ```
//!
//! # Cargo features
//!
//! - `dead-task-check` (default): cancel tasks blocked on a mutex, event or join that nothing
//!   can release anymore, instead of failing with `Fatal::Deadlock`
//! - `stack-debug` (default): verify the stack sentinels of every task before it runs
//! - `std`: the hosted `port::hosted::StdPort`
//! - `isa-cortex-m`, `isa-riscv`: bare-metal ports

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod error;
mod executor;
mod irq;
mod list;
pub mod port;
mod stack;
pub mod sync;
pub mod task;
pub mod time;
pub mod timer;
pub mod unsync;

pub use error::{Cancelled, Fatal, SpawnError};
pub use executor::{Runtime, Scheduler, TaskId, Wakeup};
pub use irq::IrqReady;
pub use list::WaitList;
pub use stack::{Stack, MIN_STACK_SIZE, SENTINEL};
pub use time::Ticks;

/// Scheduler backed by the red-black tree timer index
pub type FastScheduler<'a, P, const N: usize> = Scheduler<'a, P, timer::fast::Timers<N>, N>;

/// Scheduler backed by the sorted-list timer index, for small task counts
pub type SmallScheduler<'a, P, const N: usize> = Scheduler<'a, P, timer::small::Timers<N>, N>;
