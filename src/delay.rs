//! Busy-wait time source for the poll loop.

use embedded_hal::delay::DelayNs;

/// Spin-loop delay calibrated against the core clock.
///
/// Good enough for the microsecond waits between status polls; it is not a
/// precise timer and always errs on the long side.
#[derive(Debug, Clone, Copy)]
pub struct SpinDelay {
    cycles_per_us: u32,
}

impl SpinDelay {
    pub const fn new(core_hz: u32) -> Self {
        let cycles_per_us = core_hz / 1_000_000;
        Self {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
        }
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (u64::from(ns) * u64::from(self.cycles_per_us)).div_ceil(1_000);
        spin(cycles);
    }

    fn delay_us(&mut self, us: u32) {
        spin(u64::from(us) * u64::from(self.cycles_per_us));
    }
}

#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
fn spin(cycles: u64) {
    let mut left = cycles;
    while left > 0 {
        let chunk = left.min(u64::from(u32::MAX));
        cortex_m::asm::delay(chunk as u32);
        left -= chunk;
    }
}

#[cfg(not(all(feature = "cortex-m", target_arch = "arm")))]
fn spin(cycles: u64) {
    for _ in 0..cycles {
        core::hint::spin_loop();
    }
}
