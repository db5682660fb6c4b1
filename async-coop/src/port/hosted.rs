//! Hosted port on top of `std`

use core::cmp;
use std::{thread, time::Duration, time::Instant};

use super::Port;
use crate::time::Ticks;

/// Longest single sleep; wakers fired from other threads are noticed within this period
const IDLE_SLICE_MS: u32 = 10;

/// Millisecond ticks counted from construction
pub struct StdPort {
    start: Instant,
}

impl StdPort {
    /// Starts the clock
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for StdPort {
    fn ticks_per_sec(&self) -> u32 {
        1000
    }

    fn now(&self) -> Ticks {
        // truncation is the wrap-around of the tick counter
        self.start.elapsed().as_millis() as Ticks
    }

    fn idle(&self, timeout: Option<Ticks>) {
        let ms = timeout.map_or(IDLE_SLICE_MS, |t| cmp::min(t, IDLE_SLICE_MS));
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_moves_forward() {
        let port = StdPort::new();
        let before = port.now();
        port.idle(Some(2));
        assert!(port.now().wrapping_sub(before) >= 2);
    }
}
