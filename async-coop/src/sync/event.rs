use core::{
    cell::RefCell,
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use critical_section::{CriticalSection, Mutex};

use crate::{
    error::{Cancelled, Fatal},
    executor::{Runtime, TaskId, Wakeup},
    time::{self, Ticks},
};

pub(crate) struct Waiters<const W: usize> {
    // bumped on every `set`
    epoch: u32,
    wakers: heapless::Vec<Waker, W>,
}

impl<const W: usize> Waiters<W> {
    const fn new() -> Self {
        Self {
            epoch: 0,
            wakers: heapless::Vec::new(),
        }
    }

    fn register(&mut self, waker: &Waker) -> Option<u32> {
        if !self.wakers.iter().any(|w| w.will_wake(waker)) {
            self.wakers.push(waker.clone()).ok()?;
        }
        Some(self.epoch)
    }

    fn unregister(&mut self, waker: &Waker) {
        self.wakers.retain(|w| !w.will_wake(waker));
    }

    fn notify(&mut self) -> usize {
        self.epoch = self.epoch.wrapping_add(1);
        let n = self.wakers.len();
        while let Some(waker) = self.wakers.pop() {
            waker.wake();
        }
        n
    }
}

/// An event that interrupt handlers can set
///
/// Holds up to `W` waiting tasks; more is a fatal error (`Fatal::IrqWaitersExhausted`).
pub struct Event<const W: usize = 4> {
    waiters: Mutex<RefCell<Waiters<W>>>,
}

impl<const W: usize> Event<W> {
    /// Creates a new event
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(RefCell::new(Waiters::new())),
        }
    }

    /// Wakes every waiting task; safe to call from an interrupt handler
    ///
    /// Returns the number of woken tasks
    pub fn set_in_irq(&self) -> usize {
        critical_section::with(|cs| self.waiters.borrow_ref_mut(cs).notify())
    }

    /// Same as `set_in_irq`, for use from tasks
    pub fn set(&self) -> usize {
        self.set_in_irq()
    }

    /// Waits until an interrupt handler (or a task) sets the event
    pub async fn wait_from_irq<R>(&self, rt: &R) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        self.wait_until(rt, None, |_| false).await.map(drop)
    }

    /// `wait_from_irq` with a timeout; `Ok(false)` means it timed out
    pub async fn wait_timeout_from_irq<R>(&self, rt: &R, ticks: Ticks) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        self.wait_until(rt, Some(ticks), |_| false).await
    }

    /// `wait_timeout_from_irq` with the timeout in milliseconds
    pub async fn wait_ms_from_irq<R>(&self, rt: &R, ms: u32) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let ticks = time::ms_to_ticks(ms, rt.ticks_per_sec());
        self.wait_timeout_from_irq(rt, ticks).await
    }

    /// `wait_timeout_from_irq` with the timeout in seconds
    pub async fn wait_sec_from_irq<R>(&self, rt: &R, sec: u32) -> Result<bool, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let ticks = time::sec_to_ticks(sec, rt.ticks_per_sec());
        self.wait_timeout_from_irq(rt, ticks).await
    }

    /// Waits for the next `set` unless `ready` already holds
    ///
    /// `ready` runs in the same critical section that registers the waiter, so a `set` from an
    /// interrupt cannot slip in between the check and the registration.
    pub(crate) fn wait_until<'a, R, C>(
        &'a self,
        rt: &'a R,
        timeout: Option<Ticks>,
        ready: C,
    ) -> IrqWait<'a, R, C, W>
    where
        R: Runtime + ?Sized,
        C: FnMut(CriticalSection<'_>) -> bool + Unpin,
    {
        IrqWait {
            rt,
            waiters: &self.waiters,
            ready,
            timeout,
            state: None,
        }
    }
}

impl<const W: usize> Default for Event<W> {
    fn default() -> Self {
        Self::new()
    }
}

struct Registration {
    task: TaskId,
    epoch: u32,
    waker: Waker,
    deadline: Option<Ticks>,
}

pub(crate) struct IrqWait<'a, R: Runtime + ?Sized, C, const W: usize> {
    rt: &'a R,
    waiters: &'a Mutex<RefCell<Waiters<W>>>,
    ready: C,
    timeout: Option<Ticks>,
    state: Option<Registration>,
}

impl<R, C, const W: usize> Future for IrqWait<'_, R, C, W>
where
    R: Runtime + ?Sized,
    C: FnMut(CriticalSection<'_>) -> bool + Unpin,
{
    type Output = Result<bool, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let rt = this.rt;

        let registered = this
            .state
            .as_ref()
            .map(|reg| (reg.task, reg.epoch, reg.deadline));
        let Some((task, epoch, deadline)) = registered else {
            let waiters = this.waiters;
            let ready = &mut this.ready;
            let epoch = critical_section::with(|cs| {
                if ready(cs) {
                    return Ok(None);
                }
                waiters
                    .borrow_ref_mut(cs)
                    .register(cx.waker())
                    .map(Some)
                    .ok_or(Fatal::IrqWaitersExhausted)
            });
            let epoch = match epoch {
                Ok(Some(epoch)) => epoch,
                Ok(None) => return Poll::Ready(Ok(true)),
                Err(error) => rt.fatal(error),
            };

            let task = rt.current();
            let deadline = this.timeout.map(|ticks| time::deadline_after(rt.now(), ticks));
            rt.block(task);
            if let Some(deadline) = deadline {
                rt.arm_timer(task, deadline);
            }
            this.state = Some(Registration {
                task,
                epoch,
                waker: cx.waker().clone(),
                deadline,
            });
            return Poll::Pending;
        };

        let wakeup = rt.take_wakeup(task);
        let fired = critical_section::with(|cs| this.waiters.borrow_ref(cs).epoch != epoch);

        let res = if wakeup == Some(Wakeup::Cancelled) {
            Err(Cancelled)
        } else if fired {
            Ok(true)
        } else if wakeup == Some(Wakeup::TimedOut)
            || deadline.map_or(false, |deadline| time::expired(deadline, rt.now()))
        {
            Ok(false)
        } else {
            // not for us; keep waiting
            rt.block(task);
            if let Some(deadline) = deadline {
                rt.arm_timer(task, deadline);
            }
            return Poll::Pending;
        };

        this.release();
        Poll::Ready(res)
    }
}

impl<R, C, const W: usize> IrqWait<'_, R, C, W>
where
    R: Runtime + ?Sized,
{
    fn release(&mut self) {
        if let Some(reg) = self.state.take() {
            critical_section::with(|cs| self.waiters.borrow_ref_mut(cs).unregister(&reg.waker));
            self.rt.disarm_timer(reg.task);
        }
    }
}

impl<R, C, const W: usize> Drop for IrqWait<'_, R, C, W>
where
    R: Runtime + ?Sized,
{
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use core::task::{RawWaker, RawWakerVTable};

    use super::*;

    static VTABLE: RawWakerVTable = {
        unsafe fn clone(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE)
        }
        unsafe fn noop(_: *const ()) {}

        RawWakerVTable::new(clone, noop, noop, noop)
    };

    fn waker(id: usize) -> Waker {
        unsafe { Waker::from_raw(RawWaker::new(id as *const (), &VTABLE)) }
    }

    #[test]
    fn waiters_are_deduplicated_and_bounded() {
        let mut waiters = Waiters::<2>::new();
        assert_eq!(waiters.register(&waker(1)), Some(0));
        assert_eq!(waiters.register(&waker(1)), Some(0));
        assert_eq!(waiters.register(&waker(2)), Some(0));
        assert_eq!(waiters.register(&waker(3)), None);

        waiters.unregister(&waker(1));
        assert_eq!(waiters.notify(), 1);
        assert_eq!(waiters.epoch, 1);
        assert_eq!(waiters.register(&waker(3)), Some(1));
    }
}
