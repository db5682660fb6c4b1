use core::cell::RefCell;

use heapless::Deque;

use super::Event;
use crate::{error::Cancelled, executor::Runtime};

/// Bounded MPMC channel of `CAP` elements
///
/// Producers and consumers share a single `Event`: every transfer signals it and every blocked
/// side re-checks the buffer when it fires. Bulk transfers move as much as fits at once and
/// block for the rest, so a transfer larger than the capacity completes in several rounds.
pub struct Channel<T, const CAP: usize> {
    buffer: RefCell<Deque<T, CAP>>,
    event: Event,
}

impl<T, const CAP: usize> Channel<T, CAP> {
    /// Creates a new, empty channel
    pub const fn new() -> Self {
        Self {
            buffer: RefCell::new(Deque::new()),
            event: Event::new(),
        }
    }

    /// Sends `item`, waiting for room if the channel is full
    pub async fn put<R>(&self, rt: &R, item: T) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut item = item;
        loop {
            match self.try_put(rt, item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
            self.event.wait(rt).await?;
        }
    }

    /// Receives an element, waiting for one if the channel is empty
    pub async fn get<R>(&self, rt: &R) -> Result<T, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        loop {
            if let Some(item) = self.try_get(rt) {
                return Ok(item);
            }
            self.event.wait(rt).await?;
        }
    }

    /// Attempts to send `item`; hands it back if the channel is full
    pub fn try_put<R>(&self, rt: &R, item: T) -> Result<(), T>
    where
        R: Runtime + ?Sized,
    {
        self.buffer.borrow_mut().push_back(item)?;
        self.event.set(rt);
        Ok(())
    }

    /// Attempts to receive an element; `None` if the channel is empty
    pub fn try_get<R>(&self, rt: &R) -> Option<T>
    where
        R: Runtime + ?Sized,
    {
        let item = self.buffer.borrow_mut().pop_front()?;
        self.event.set(rt);
        Some(item)
    }

    /// Number of buffered elements
    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// Is the channel empty?
    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    /// Is the channel full?
    pub fn is_full(&self) -> bool {
        self.buffer.borrow().is_full()
    }

    /// Maximum number of buffered elements
    pub fn capacity(&self) -> usize {
        CAP
    }
}

impl<T, const CAP: usize> Channel<T, CAP>
where
    T: Copy,
{
    /// Sends all of `items`, in order, waiting for room as often as needed
    pub async fn put_n<R>(&self, rt: &R, items: &[T]) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut rest = items;
        loop {
            let n = push_some(&mut self.buffer.borrow_mut(), rest);
            rest = &rest[n..];
            if n != 0 {
                self.event.set(rt);
            }
            if rest.is_empty() {
                return Ok(());
            }
            self.event.wait(rt).await?;
        }
    }

    /// Fills all of `out`, in order, waiting for data as often as needed
    pub async fn get_n<R>(&self, rt: &R, out: &mut [T]) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut done = 0;
        loop {
            let n = pop_some(&mut self.buffer.borrow_mut(), &mut out[done..]);
            done += n;
            if n != 0 {
                self.event.set(rt);
            }
            if done == out.len() {
                return Ok(());
            }
            self.event.wait(rt).await?;
        }
    }
}

impl<T, const CAP: usize> Default for Channel<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends as many of `items` as fit; returns how many did
pub(crate) fn push_some<T, const CAP: usize>(ring: &mut Deque<T, CAP>, items: &[T]) -> usize
where
    T: Copy,
{
    let mut n = 0;
    for &item in items {
        if ring.push_back(item).is_err() {
            break;
        }
        n += 1;
    }
    n
}

/// Moves up to `out.len()` elements out of `ring`; returns how many it did
pub(crate) fn pop_some<T, const CAP: usize>(ring: &mut Deque<T, CAP>, out: &mut [T]) -> usize {
    let mut n = 0;
    for slot in out.iter_mut() {
        match ring.pop_front() {
            Some(item) => *slot = item,
            None => break,
        }
        n += 1;
    }
    n
}
