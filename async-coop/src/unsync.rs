//! Task synchronization primitives that are *not* thread / interrupt safe (`!Sync`)
//!
//! Every blocking method takes the runtime (`&impl Runtime`, usually the `Scheduler`) and
//! reports a forced cancellation as `Err(Cancelled)`.

pub(crate) mod channel;
mod event;
mod mutex;
pub(crate) mod wait_list;

pub use channel::Channel;
pub use event::Event;
pub use mutex::{Mutex, MutexGuard};
