use core::cell::Cell;

use super::Port;
use crate::time::Ticks;

/// A simulated clock
///
/// Time only moves when the scheduler idles (the clock jumps straight to the next deadline) or
/// when `advance` is called, which makes schedules fully deterministic. Idling without a
/// deadline means waiting for an interrupt that can never come, so it panics.
pub struct SimPort {
    now: Cell<Ticks>,
    ticks_per_sec: u32,
    idles: Cell<usize>,
}

impl SimPort {
    /// Creates a clock at tick 0
    pub const fn new(ticks_per_sec: u32) -> Self {
        Self::starting_at(0, ticks_per_sec)
    }

    /// Creates a clock at tick `now`
    pub const fn starting_at(now: Ticks, ticks_per_sec: u32) -> Self {
        Self {
            now: Cell::new(now),
            ticks_per_sec,
            idles: Cell::new(0),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, ticks: Ticks) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }

    /// How many times the scheduler has idled
    pub fn idles(&self) -> usize {
        self.idles.get()
    }
}

impl Port for SimPort {
    fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    fn now(&self) -> Ticks {
        self.now.get()
    }

    fn idle(&self, timeout: Option<Ticks>) {
        self.idles.set(self.idles.get() + 1);
        match timeout {
            Some(ticks) => self.advance(ticks),
            None => panic!("simulated clock idled with nothing to wait for"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_advances() {
        let port = SimPort::starting_at(u32::MAX, 1000);
        port.idle(Some(2));
        assert_eq!(port.now(), 1);
        assert_eq!(port.idles(), 1);
    }

    #[test]
    #[should_panic]
    fn idle_forever() {
        SimPort::new(1000).idle(None);
    }
}
