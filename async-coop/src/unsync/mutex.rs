use core::{
    cell::{Cell, UnsafeCell},
    future::Future,
    ops,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    error::Cancelled,
    executor::{Runtime, TaskId, Wakeup},
    list::WaitList,
};

/// A mutual exclusion primitive for protecting shared data
///
/// Waiters are served in FIFO order. Unlocking with waiters hands the lock straight to the
/// longest waiting task: the mutex never appears unlocked in between, so a task that did not
/// wait cannot barge in.
pub struct Mutex<T> {
    locked: Cell<bool>,
    waiters: WaitList,
    value: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    /// Creates a new, unlocked mutex
    pub const fn new(t: T) -> Self {
        Self {
            locked: Cell::new(false),
            waiters: WaitList::new(),
            value: UnsafeCell::new(t),
        }
    }

    /// Acquires the lock
    ///
    /// Returns a guard that releases the lock when dropped, or `Err(Cancelled)` if the wait was
    /// cancelled (then the lock is not held).
    pub async fn lock<'a, R>(&'a self, rt: &'a R) -> Result<MutexGuard<'a, T, R>, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        struct Lock<'a, T, R: Runtime + ?Sized> {
            mutex: &'a Mutex<T>,
            rt: &'a R,
            waiting: Option<TaskId>,
        }

        impl<'a, T, R> Future for Lock<'a, T, R>
        where
            R: Runtime + ?Sized,
        {
            type Output = Result<MutexGuard<'a, T, R>, Cancelled>;

            fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
                let (mutex, rt) = (self.mutex, self.rt);

                let Some(task) = self.waiting else {
                    // Try acquiring the lock.
                    return match mutex.try_lock(rt) {
                        Some(guard) => Poll::Ready(Ok(guard)),
                        None => {
                            let task = rt.current();
                            rt.wait_on(task, &mutex.waiters);
                            self.waiting = Some(task);
                            Poll::Pending
                        }
                    };
                };

                match rt.take_wakeup(task) {
                    // the previous owner handed the lock over
                    Some(Wakeup::Signaled) => {
                        self.waiting = None;
                        Poll::Ready(Ok(MutexGuard { mutex, rt }))
                    }
                    Some(Wakeup::Cancelled) => {
                        self.waiting = None;
                        Poll::Ready(Err(Cancelled))
                    }
                    _ => Poll::Pending,
                }
            }
        }

        impl<T, R> Drop for Lock<'_, T, R>
        where
            R: Runtime + ?Sized,
        {
            fn drop(&mut self) {
                if let Some(task) = self.waiting {
                    if self.rt.is_waiting_on(task, &self.mutex.waiters) {
                        self.rt.unlink(task);
                    } else if self.rt.take_wakeup(task) == Some(Wakeup::Signaled) {
                        // we own the lock but nobody will ever see the guard; pass it on
                        self.mutex.release(self.rt);
                    }
                }
            }
        }

        Lock {
            mutex: self,
            rt,
            waiting: None,
        }
        .await
    }

    /// Attempts to acquire the lock without blocking
    pub fn try_lock<'a, R>(&'a self, rt: &'a R) -> Option<MutexGuard<'a, T, R>>
    where
        R: Runtime + ?Sized,
    {
        if !self.locked.get() {
            self.locked.set(true);
            Some(MutexGuard { mutex: self, rt })
        } else {
            None
        }
    }

    /// Is the lock held?
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    fn release<R>(&self, rt: &R)
    where
        R: Runtime + ?Sized,
    {
        // with a waiter the lock changes hands and stays locked
        if rt.wake_one(&self.waiters).is_none() {
            self.locked.set(false);
        }
    }
}

/// A guard that releases the lock when dropped
pub struct MutexGuard<'a, T, R>
where
    R: Runtime + ?Sized,
{
    mutex: &'a Mutex<T>,
    rt: &'a R,
}

impl<T, R> MutexGuard<'_, T, R>
where
    R: Runtime + ?Sized,
{
    /// Releases the lock
    pub fn unlock(self) {}
}

impl<T, R> Drop for MutexGuard<'_, T, R>
where
    R: Runtime + ?Sized,
{
    fn drop(&mut self) {
        self.mutex.release(self.rt);
    }
}

impl<T, R> ops::Deref for MutexGuard<'_, T, R>
where
    R: Runtime + ?Sized,
{
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T, R> ops::DerefMut for MutexGuard<'_, T, R>
where
    R: Runtime + ?Sized,
{
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}
