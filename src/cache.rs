//! Data cache maintenance ahead of a memory-to-device transfer.
//!
//! The DMA engine reads physical memory directly, so anything the CPU wrote
//! to the staging buffer must be cleaned out of the data cache first.

/// Makes CPU writes to a memory range visible to bus masters.
pub trait CacheMaintenance {
    /// Write back every dirty cache line overlapping `len` bytes at `addr`,
    /// and wait until the write-back has completed.
    fn clean_range(&mut self, addr: *const u8, len: usize);
}

impl<C: CacheMaintenance + ?Sized> CacheMaintenance for &mut C {
    fn clean_range(&mut self, addr: *const u8, len: usize) {
        (**self).clean_range(addr, len)
    }
}

/// For buffers reached through a cache-coherent port (e.g. HPC ports behind
/// a coherent interconnect): nothing to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoherentPort;

impl CacheMaintenance for CoherentPort {
    fn clean_range(&mut self, _addr: *const u8, _len: usize) {}
}

/// Rounds `[addr, addr + len)` out to whole cache lines.
pub fn line_span(addr: usize, len: usize, line: usize) -> (usize, usize) {
    let start = addr & !(line - 1);
    let end = (addr + len + line - 1) & !(line - 1);
    (start, end)
}

#[cfg(target_arch = "aarch64")]
pub use self::aarch64::Aarch64DataCache;

#[cfg(target_arch = "aarch64")]
mod aarch64 {
    use core::arch::asm;

    use super::{line_span, CacheMaintenance};

    /// ARMv8-A clean by VA to the point of coherency.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Aarch64DataCache;

    impl Aarch64DataCache {
        pub const LINE_SIZE: usize = 64;
    }

    impl CacheMaintenance for Aarch64DataCache {
        fn clean_range(&mut self, addr: *const u8, len: usize) {
            if len == 0 {
                return;
            }

            let (start, end) = line_span(addr as usize, len, Self::LINE_SIZE);
            for line in (start..end).step_by(Self::LINE_SIZE) {
                // SAFETY: `dc cvac` only writes back a line; it never changes
                // what the CPU observes at that address.
                unsafe { asm!("dc cvac, {0}", in(reg) line, options(nostack, preserves_flags)) };
            }
            // SAFETY: barrier only.
            unsafe { asm!("dsb sy", options(nostack, preserves_flags)) };
        }
    }
}

#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
pub use self::cortex_m_cache::CortexMDataCache;

#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
mod cortex_m_cache {
    use cortex_m::peripheral::SCB;

    use super::{line_span, CacheMaintenance};

    /// Cortex-M7 L1 data cache, driven through the SCB.
    pub struct CortexMDataCache {
        scb: SCB,
    }

    impl CortexMDataCache {
        const LINE_SIZE: usize = 32;

        pub fn new(scb: SCB) -> Self {
            Self { scb }
        }
    }

    impl CacheMaintenance for CortexMDataCache {
        fn clean_range(&mut self, addr: *const u8, len: usize) {
            if len == 0 {
                return;
            }
            let (start, end) = line_span(addr as usize, len, Self::LINE_SIZE);
            // Ends with DSB + ISB.
            self.scb.clean_dcache_by_address(start, end - start);
        }
    }
}
