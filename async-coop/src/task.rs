//! Task-level blocking operations

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    error::Cancelled,
    executor::{Runtime, TaskId, Wakeup},
    time::{self, Ticks},
    unsync::wait_list::Wait,
};

/// Use `r#yield(rt).await` to move the current task to the back of the ready queue
///
/// If no other task is ready the current task keeps running.
pub async fn r#yield<R>(rt: &R)
where
    R: Runtime + ?Sized,
{
    struct Yield<'a, R: ?Sized> {
        rt: &'a R,
        yielded: bool,
    }

    impl<R> Future for Yield<'_, R>
    where
        R: Runtime + ?Sized,
    {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                self.rt.requeue(self.rt.current());
                Poll::Pending
            }
        }
    }

    Yield { rt, yielded: false }.await
}

/// Same as `r#yield`
pub async fn yield_now<R>(rt: &R)
where
    R: Runtime + ?Sized,
{
    r#yield(rt).await
}

/// Suspends the current task for `ticks` ticks
///
/// Delays longer than `time::MAX_DELAY` are clamped. Another task can end the sleep early with
/// `cancel_wait`, which is reported as `Err(Cancelled)`.
pub async fn sleep<R>(rt: &R, ticks: Ticks) -> Result<(), Cancelled>
where
    R: Runtime + ?Sized,
{
    struct Sleep<'a, R: Runtime + ?Sized> {
        rt: &'a R,
        ticks: Ticks,
        // task and deadline, once armed
        armed: Option<(TaskId, Ticks)>,
    }

    impl<R> Future for Sleep<'_, R>
    where
        R: Runtime + ?Sized,
    {
        type Output = Result<(), Cancelled>;

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            let rt = self.rt;
            let (task, deadline) = match self.armed {
                Some(armed) => armed,
                None => {
                    let task = rt.current();
                    let deadline = time::deadline_after(rt.now(), self.ticks);
                    rt.arm_timer(task, deadline);
                    rt.block(task);
                    self.armed = Some((task, deadline));
                    return Poll::Pending;
                }
            };

            let res = match rt.take_wakeup(task) {
                Some(Wakeup::Cancelled) => Err(Cancelled),
                Some(Wakeup::TimedOut) => Ok(()),
                _ if time::expired(deadline, rt.now()) => Ok(()),
                _ => {
                    // woken for something else; go back to sleep
                    rt.arm_timer(task, deadline);
                    rt.block(task);
                    return Poll::Pending;
                }
            };
            rt.disarm_timer(task);
            self.armed = None;
            Poll::Ready(res)
        }
    }

    impl<R> Drop for Sleep<'_, R>
    where
        R: Runtime + ?Sized,
    {
        fn drop(&mut self) {
            // dropped while asleep (e.g. the task was killed)
            if let Some((task, _)) = self.armed {
                self.rt.disarm_timer(task);
            }
        }
    }

    Sleep {
        rt,
        ticks,
        armed: None,
    }
    .await
}

/// `sleep` for a number of milliseconds
pub async fn sleep_ms<R>(rt: &R, ms: u32) -> Result<(), Cancelled>
where
    R: Runtime + ?Sized,
{
    sleep(rt, time::ms_to_ticks(ms, rt.ticks_per_sec())).await
}

/// `sleep` for a number of seconds
pub async fn sleep_sec<R>(rt: &R, sec: u32) -> Result<(), Cancelled>
where
    R: Runtime + ?Sized,
{
    sleep(rt, time::sec_to_ticks(sec, rt.ticks_per_sec())).await
}

/// Waits until `task` has finished
///
/// Returns immediately if it already has. A task that joins itself (or a cycle of tasks
/// joining each other) is eventually cancelled by the dead-task scan.
pub async fn join<R>(rt: &R, task: TaskId) -> Result<(), Cancelled>
where
    R: Runtime + ?Sized,
{
    while !rt.is_closed(task) {
        let Some(list) = rt.join_list(task) else {
            break;
        };
        Wait::new(rt, list, None).await?;
    }
    Ok(())
}

/// Suspends the current task until an interrupt handler wakes it
///
/// Interrupt handlers wake a parked task through its `Waker` or `IrqReady::pend`.
pub async fn park<R>(rt: &R) -> Result<(), Cancelled>
where
    R: Runtime + ?Sized,
{
    struct Park<'a, R: ?Sized> {
        rt: &'a R,
        task: Option<TaskId>,
    }

    impl<R> Future for Park<'_, R>
    where
        R: Runtime + ?Sized,
    {
        type Output = Result<(), Cancelled>;

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            let rt = self.rt;
            let Some(task) = self.task else {
                let task = rt.current();
                rt.block(task);
                self.task = Some(task);
                return Poll::Pending;
            };

            match rt.take_wakeup(task) {
                Some(Wakeup::Cancelled) => Poll::Ready(Err(Cancelled)),
                Some(_) => Poll::Ready(Ok(())),
                None => Poll::Pending,
            }
        }
    }

    Park { rt, task: None }.await
}
