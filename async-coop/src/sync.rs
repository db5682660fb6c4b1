//! Primitives shared between tasks and interrupt handlers
//!
//! The `*_in_irq` methods never block and are meant to be called from interrupt handlers; the
//! `*_from_irq` / `*_to_irq` methods are their task-side counterparts, which block until the
//! interrupt side acts. All shared state lives behind `critical_section::Mutex`.
//!
//! Tasks waiting here are parked outside of the scheduler's wait lists, so the dead-task scan
//! leaves them alone: only an interrupt (or `cancel_wait`) can release them.

mod channel;
mod event;

pub use channel::Channel;
pub use event::Event;
