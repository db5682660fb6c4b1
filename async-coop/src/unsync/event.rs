use super::wait_list::Wait;
use crate::{
    error::Cancelled,
    executor::Runtime,
    list::WaitList,
    time::{self, Ticks},
};

/// A broadcast signal without memory
///
/// `set` wakes the tasks that are waiting at that moment; a `set` with nobody waiting is lost.
pub struct Event {
    waiters: WaitList,
}

impl Event {
    /// Creates a new event
    pub const fn new() -> Self {
        Self {
            waiters: WaitList::new(),
        }
    }

    /// Wakes every waiting task, in the order they started waiting
    ///
    /// Returns the number of woken tasks
    pub fn set<R>(&self, rt: &R) -> usize
    where
        R: Runtime + ?Sized,
    {
        rt.wake_all(&self.waiters)
    }

    /// Waits for the next `set`
    pub async fn wait<R>(&self, rt: &R) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        Wait::new(rt, &self.waiters, None).await.map(drop)
    }

    /// Waits for the next `set`, for at most `ticks` ticks
    ///
    /// Returns `Ok(true)` if the event was set and `Ok(false)` on timeout
    pub async fn wait_timeout<R>(&self, rt: &R, ticks: Ticks) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        Wait::new(rt, &self.waiters, Some(ticks)).await
    }

    /// `wait_timeout` in milliseconds
    pub async fn wait_ms<R>(&self, rt: &R, ms: u32) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        self.wait_timeout(rt, time::ms_to_ticks(ms, rt.ticks_per_sec()))
            .await
    }

    /// `wait_timeout` in seconds
    pub async fn wait_sec<R>(&self, rt: &R, sec: u32) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        self.wait_timeout(rt, time::sec_to_ticks(sec, rt.ticks_per_sec()))
            .await
    }

    /// Number of waiting tasks
    pub fn waiters<R>(&self, rt: &R) -> usize
    where
        R: Runtime + ?Sized,
    {
        rt.waiters(&self.waiters)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
