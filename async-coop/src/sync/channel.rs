use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use super::Event;
use crate::{
    error::Cancelled,
    executor::Runtime,
    unsync::channel::{pop_some, push_some},
};

/// Bounded channel between interrupt handlers and tasks
///
/// Interrupt handlers use the `*_in_irq` methods, which transfer what they can and never block;
/// tasks use the `*_to_irq` / `*_from_irq` methods, which block until the transfer completes.
/// Up to `W` tasks can be blocked on the channel at once.
pub struct Channel<T, const CAP: usize, const W: usize = 4> {
    ring: Mutex<RefCell<Deque<T, CAP>>>,
    event: Event<W>,
}

impl<T, const CAP: usize, const W: usize> Channel<T, CAP, W> {
    /// Creates a new, empty channel
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Deque::new())),
            event: Event::new(),
        }
    }

    /// Sends `item` from an interrupt handler; hands it back if the channel is full
    pub fn put_in_irq(&self, item: T) -> Result<(), T> {
        critical_section::with(|cs| self.ring.borrow_ref_mut(cs).push_back(item))?;
        self.event.set_in_irq();
        Ok(())
    }

    /// Receives an element from an interrupt handler; `None` when the channel is empty
    pub fn get_in_irq(&self) -> Option<T> {
        let item = critical_section::with(|cs| self.ring.borrow_ref_mut(cs).pop_front())?;
        self.event.set_in_irq();
        Some(item)
    }

    /// Receives an element, waiting for an interrupt handler to send one
    pub async fn get_from_irq<R>(&self, rt: &R) -> Result<T, Cancelled>
    where
        R: Runtime + ?Sized,
    {
        loop {
            if let Some(item) = self.get_in_irq() {
                return Ok(item);
            }
            self.event
                .wait_until(rt, None, |cs| !self.ring.borrow_ref(cs).is_empty())
                .await?;
        }
    }

    /// Sends `item`, waiting for an interrupt handler to make room
    pub async fn put_to_irq<R>(&self, rt: &R, item: T) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut item = item;
        loop {
            match self.put_in_irq(item) {
                Ok(()) => return Ok(()),
                Err(back) => item = back,
            }
            self.event
                .wait_until(rt, None, |cs| !self.ring.borrow_ref(cs).is_full())
                .await?;
        }
    }

    /// Number of buffered elements
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.ring.borrow_ref(cs).len())
    }

    /// Is the channel empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered elements
    pub fn capacity(&self) -> usize {
        CAP
    }
}

impl<T, const CAP: usize, const W: usize> Channel<T, CAP, W>
where
    T: Copy,
{
    /// Sends as many of `items` as fit, from an interrupt handler
    ///
    /// Returns the number of elements sent: 0 when the channel is full
    pub fn put_n_in_irq(&self, items: &[T]) -> usize {
        let n = critical_section::with(|cs| push_some(&mut self.ring.borrow_ref_mut(cs), items));
        if n != 0 {
            self.event.set_in_irq();
        }
        n
    }

    /// Fills as much of `out` as there is data for, from an interrupt handler
    ///
    /// Returns the number of elements received: 0 when the channel is empty
    pub fn get_n_in_irq(&self, out: &mut [T]) -> usize {
        let n = critical_section::with(|cs| pop_some(&mut self.ring.borrow_ref_mut(cs), out));
        if n != 0 {
            self.event.set_in_irq();
        }
        n
    }

    /// Sends all of `items`, waiting for interrupt handlers to make room as often as needed
    pub async fn put_n_to_irq<R>(&self, rt: &R, items: &[T]) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut rest = items;
        loop {
            rest = &rest[self.put_n_in_irq(rest)..];
            if rest.is_empty() {
                return Ok(());
            }
            self.event
                .wait_until(rt, None, |cs| !self.ring.borrow_ref(cs).is_full())
                .await?;
        }
    }

    /// Fills all of `out`, waiting for interrupt handlers to send data as often as needed
    pub async fn get_n_from_irq<R>(&self, rt: &R, out: &mut [T]) -> Result<(), Cancelled>
    where
        R: Runtime + ?Sized,
    {
        let mut done = 0;
        loop {
            done += self.get_n_in_irq(&mut out[done..]);
            if done == out.len() {
                return Ok(());
            }
            self.event
                .wait_until(rt, None, |cs| !self.ring.borrow_ref(cs).is_empty())
                .await?;
        }
    }
}

impl<T, const CAP: usize, const W: usize> Default for Channel<T, CAP, W> {
    fn default() -> Self {
        Self::new()
    }
}
