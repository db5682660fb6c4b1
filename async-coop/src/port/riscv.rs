//! RISC-V port; call `RiscvPort::tick` from the machine timer interrupt

use super::{Port, TickCounter};
use crate::{error::Fatal, time::Ticks};

/// Tick counter plus `wfi` idle
pub struct RiscvPort {
    counter: TickCounter,
    ticks_per_sec: u32,
}

impl RiscvPort {
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

impl Port for RiscvPort {
    fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    fn now(&self) -> Ticks {
        self.counter.now()
    }

    fn idle(&self, _timeout: Option<Ticks>) {
        #[allow(unused_unsafe)]
        unsafe {
            ::riscv::asm::wfi()
        }
    }

    /// This keeps dropping into the debugger and never returns
    fn fatal(&self, _error: &Fatal) -> ! {
        loop {
            #[allow(unused_unsafe)]
            unsafe {
                ::riscv::asm::ebreak()
            }
        }
    }
}
