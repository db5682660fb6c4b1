use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    error::Cancelled,
    executor::{Runtime, TaskId, Wakeup},
    list::WaitList,
    time::{self, Ticks},
};

/// Blocks the current task on a wait list, with an optional timeout
///
/// Resolves to `Ok(true)` when signalled and `Ok(false)` when the timeout expired first.
pub(crate) struct Wait<'a, R: Runtime + ?Sized> {
    rt: &'a R,
    list: &'a WaitList,
    timeout: Option<Ticks>,
    task: Option<TaskId>,
}

impl<'a, R> Wait<'a, R>
where
    R: Runtime + ?Sized,
{
    pub(crate) fn new(rt: &'a R, list: &'a WaitList, timeout: Option<Ticks>) -> Self {
        Self {
            rt,
            list,
            timeout,
            task: None,
        }
    }
}

impl<R> Future for Wait<'_, R>
where
    R: Runtime + ?Sized,
{
    type Output = Result<bool, Cancelled>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rt = self.rt;
        let Some(task) = self.task else {
            let task = rt.current();
            rt.wait_on(task, self.list);
            if let Some(timeout) = self.timeout {
                rt.arm_timer(task, time::deadline_after(rt.now(), timeout));
            }
            self.task = Some(task);
            return Poll::Pending;
        };

        let res = match rt.take_wakeup(task) {
            Some(Wakeup::Signaled) => Ok(true),
            Some(Wakeup::TimedOut) => Ok(false),
            Some(Wakeup::Cancelled) => Err(Cancelled),
            _ => return Poll::Pending,
        };
        self.task = None;
        Poll::Ready(res)
    }
}

impl<R> Drop for Wait<'_, R>
where
    R: Runtime + ?Sized,
{
    fn drop(&mut self) {
        // still queued: the wait is being abandoned
        if let Some(task) = self.task {
            if self.rt.is_waiting_on(task, self.list) {
                self.rt.unlink(task);
            }
            self.rt.disarm_timer(task);
        }
    }
}
