//! Error and outcome types

use core::fmt;

use crate::TaskId;

/// A blocking call was forcibly cancelled (see `Scheduler::cancel_wait`) instead of being
/// satisfied
///
/// This is a normal control-flow outcome, not a runtime failure
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cancelled;

impl Cancelled {
    /// Status code used at C-style boundaries; successful calls report `0`
    pub const CODE: i32 = -1;
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("wait cancelled")
    }
}

/// Reasons `Scheduler::spawn` can refuse a task
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpawnError {
    /// Every task slot is in use
    TooManyTasks,
    /// The task does not fit in the stack it was given
    StackTooSmall {
        /// Bytes needed for the task and both sentinels
        required: usize,
        /// Size of the stack
        available: usize,
    },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TooManyTasks => f.write_str("no free task slot"),
            SpawnError::StackTooSmall {
                required,
                available,
            } => write!(
                f,
                "task needs {} bytes of stack but only {} are available",
                required, available
            ),
        }
    }
}

/// Which end of a task stack had its sentinel overwritten
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackEnd {
    /// Lowest address
    Bottom,
    /// Highest address
    Top,
}

/// Unrecoverable conditions; these are programming errors in the application
///
/// The scheduler logs them and then invokes `Port::fatal`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fatal {
    /// No task is ready, no timer is pending and nothing can wake a task up
    Deadlock,
    /// The timer index refused an entry for this task
    TimerCollision(TaskId),
    /// A stack sentinel was overwritten
    StackCorrupted {
        /// Owner of the stack
        task: TaskId,
        /// Corrupted end
        end: StackEnd,
    },
    /// `Scheduler::run` was re-entered
    NestedRun,
    /// No wait list head was left for a blocking task
    WaitListExhausted,
    /// An interrupt-safe primitive has more waiting tasks than it can hold
    IrqWaitersExhausted,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::Deadlock => f.write_str("no runnable task and no pending timer"),
            Fatal::TimerCollision(task) => write!(f, "timer index collision for {}", task),
            Fatal::StackCorrupted { task, end } => {
                let end = match end {
                    StackEnd::Bottom => "bottom",
                    StackEnd::Top => "top",
                };
                write!(f, "stack sentinel at the {} of {} overwritten", end, task)
            }
            Fatal::NestedRun => f.write_str("`Scheduler::run` re-entered"),
            Fatal::WaitListExhausted => f.write_str("out of wait list heads"),
            Fatal::IrqWaitersExhausted => f.write_str("too many tasks waiting on an interrupt"),
        }
    }
}
