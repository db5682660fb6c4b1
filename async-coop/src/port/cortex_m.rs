//! ARM Cortex-M port
//!
//! The application configures SysTick (or any periodic interrupt) and calls
//! `CortexMPort::tick` from its handler:
//!
//! ``` ignore
//! static PORT: CortexMPort = CortexMPort::new(1024);
//!
//! #[exception]
//! fn SysTick() {
//!     PORT.tick();
//! }
//! ```

use super::{Port, TickCounter};
use crate::{error::Fatal, time::Ticks};

/// Tick counter plus `wfi` idle
pub struct CortexMPort {
    counter: TickCounter,
    ticks_per_sec: u32,
}

impl CortexMPort {
    /// `ticks_per_sec` must match the rate at which `tick` is called
    pub const fn new(ticks_per_sec: u32) -> Self {
        Self {
            counter: TickCounter::new(),
            ticks_per_sec,
        }
    }

    /// Advances the clock; call from the periodic timer interrupt
    pub fn tick(&self) {
        self.counter.tick()
    }
}

impl Port for CortexMPort {
    fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    fn now(&self) -> Ticks {
        self.counter.now()
    }

    fn idle(&self, _timeout: Option<Ticks>) {
        // the tick interrupt wakes us up at least once per tick
        ::cortex_m::asm::wfi();
    }

    fn fatal(&self, _error: &Fatal) -> ! {
        ::cortex_m::asm::udf()
    }
}
