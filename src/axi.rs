//! Xilinx AXI DMA engine in simple (register direct) mode.
//!
//! Only the MM2S channel is ever started. The S2MM status register is read
//! for `is_busy(DeviceToMemory)` when that channel exists, nothing else.

use core::ptr;

use log::{debug, trace};

use crate::engine::{DmaEngine, Direction, InitError, StartError};

const MM2S: usize = 0x00;
const S2MM: usize = 0x30;

const DMACR: usize = 0x00;
const DMASR: usize = 0x04;
const ADDR: usize = 0x18;
const ADDR_MSB: usize = 0x1C;
const LENGTH: usize = 0x28;

const CR_RUN_STOP: u32 = 1 << 0;
const CR_RESET: u32 = 1 << 2;

const SR_HALTED: u32 = 1 << 0;
const SR_IDLE: u32 = 1 << 1;
const SR_INT_ERR: u32 = 1 << 4;
const SR_SLV_ERR: u32 = 1 << 5;
const SR_DEC_ERR: u32 = 1 << 6;
const SR_ERR_MASK: u32 = SR_INT_ERR | SR_SLV_ERR | SR_DEC_ERR;

/// Polls allowed for the reset bit to self-clear.
pub const RESET_TIMEOUT: u32 = 500;

/// Static description of one AXI DMA instance, as generated from the
/// hardware design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxiDmaConfig {
    device_id: u32,
    base_address: usize,
    has_mm2s: bool,
    has_mm2s_dre: bool,
    mm2s_data_width: u32,
    has_s2mm: bool,
    has_sg: bool,
    length_width: u32,
    addr_width: u32,
}

impl AxiDmaConfig {
    /// Describe an engine with an MM2S channel (32-bit stream, no DRE), no
    /// S2MM channel, no scatter-gather, 26-bit length register and 32-bit
    /// addressing. Use the `with_*` methods to match the hardware design.
    ///
    /// # Safety
    ///
    /// `base_address` must be the address of an AXI DMA register block that
    /// stays mapped for as long as engines built from this config exist,
    /// and no other code may drive that block.
    pub const unsafe fn new(device_id: u32, base_address: usize) -> Self {
        Self {
            device_id,
            base_address,
            has_mm2s: true,
            has_mm2s_dre: false,
            mm2s_data_width: 32,
            has_s2mm: false,
            has_sg: false,
            length_width: 26,
            addr_width: 32,
        }
    }

    pub const fn with_mm2s(mut self, present: bool, data_width: u32, dre: bool) -> Self {
        self.has_mm2s = present;
        self.mm2s_data_width = data_width;
        self.has_mm2s_dre = dre;
        self
    }

    pub const fn with_s2mm(mut self, present: bool) -> Self {
        self.has_s2mm = present;
        self
    }

    pub const fn with_scatter_gather(mut self, included: bool) -> Self {
        self.has_sg = included;
        self
    }

    pub const fn with_length_width(mut self, bits: u32) -> Self {
        self.length_width = bits;
        self
    }

    pub const fn with_addr_width(mut self, bits: u32) -> Self {
        self.addr_width = bits;
        self
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn base_address(&self) -> usize {
        self.base_address
    }

    /// Largest byte count the length register accepts.
    pub fn max_transfer_len(&self) -> usize {
        ((1u64 << self.length_width.min(32)) - 1) as usize
    }

    /// Whether `len` bytes at `addr` can be reached with the configured
    /// address width.
    fn reaches(&self, addr: usize, len: usize) -> bool {
        if self.addr_width >= 64 {
            return true;
        }
        let last = (addr as u64).saturating_add(len as u64).saturating_sub(1);
        last >> self.addr_width == 0
    }

    fn mm2s_align(&self) -> usize {
        (self.mm2s_data_width / 8).max(1) as usize
    }

    fn is_valid(&self) -> bool {
        self.has_mm2s
            && !self.has_sg
            && (8..=26).contains(&self.length_width)
            && matches!(self.addr_width, 32 | 64)
            && self.mm2s_data_width.is_power_of_two()
            && self.mm2s_data_width >= 8
    }
}

/// Word-wide access to a register block.
pub trait RegisterAccess {
    /// # Safety
    ///
    /// See `AxiDmaConfig::new`: `base` must denote a live register block
    /// that this value gets exclusive use of.
    unsafe fn at(base: usize) -> Self;

    fn read(&self, offset: usize) -> u32;

    fn write(&mut self, offset: usize, value: u32);

    fn modify(&mut self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = self.read(offset);
        self.write(offset, f(value));
    }
}

/// Volatile memory-mapped registers.
pub struct Mmio {
    base: usize,
}

impl RegisterAccess for Mmio {
    unsafe fn at(base: usize) -> Self {
        Self { base }
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `at`'s contract guarantees a mapped register block; all
        // offsets used by `AxiDma` are word aligned and inside it.
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: as in `read`.
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

/// An initialized AXI DMA engine.
pub struct AxiDma<R = Mmio> {
    regs: R,
    config: AxiDmaConfig,
}

impl<R: RegisterAccess> AxiDma<R> {
    pub fn config(&self) -> &AxiDmaConfig {
        &self.config
    }

    fn channel(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::MemoryToDevice if self.config.has_mm2s => Some(MM2S),
            Direction::DeviceToMemory if self.config.has_s2mm => Some(S2MM),
            _ => None,
        }
    }

    fn status(&self) -> u32 {
        self.regs.read(MM2S + DMASR)
    }
}

impl<R: RegisterAccess> DmaEngine for AxiDma<R> {
    type Config = AxiDmaConfig;

    fn initialize(config: AxiDmaConfig) -> Result<Self, InitError> {
        if !config.is_valid() {
            return Err(InitError::InvalidConfig);
        }

        // SAFETY: guaranteed by the unsafe constructor of `AxiDmaConfig`.
        let regs = unsafe { R::at(config.base_address) };
        let mut dma = Self { regs, config };
        dma.reset()?;

        debug!(
            "axi dma {} at {:#x} ready (max transfer {} bytes)",
            config.device_id,
            config.base_address,
            config.max_transfer_len()
        );
        Ok(dma)
    }

    unsafe fn start_transfer(
        &mut self,
        source: *const u8,
        len: usize,
        direction: Direction,
    ) -> Result<(), StartError> {
        if direction != Direction::MemoryToDevice {
            return Err(StartError::Unsupported);
        }
        let channel = self.channel(direction).ok_or(StartError::Unsupported)?;

        if len == 0 || len > self.config.max_transfer_len() {
            return Err(StartError::InvalidLength(len));
        }

        let addr = source as usize;
        if !self.config.reaches(addr, len) {
            return Err(StartError::AddressOutOfRange(addr));
        }
        if !self.config.has_mm2s_dre && addr % self.config.mm2s_align() != 0 {
            return Err(StartError::Misaligned(addr));
        }

        let sr = self.status();
        if sr & SR_ERR_MASK != 0 {
            return Err(StartError::Halted(sr));
        }
        if sr & SR_HALTED == 0 && sr & SR_IDLE == 0 {
            return Err(StartError::Busy);
        }

        trace!("mm2s start: {:#x}, {} bytes", addr, len);

        self.regs.write(channel + ADDR, addr as u32);
        if self.config.addr_width > 32 {
            self.regs
                .write(channel + ADDR_MSB, ((addr as u64) >> 32) as u32);
        }
        self.regs.modify(channel + DMACR, |cr| cr | CR_RUN_STOP);
        // Writing the length register is what starts the transfer.
        self.regs.write(channel + LENGTH, len as u32);

        Ok(())
    }

    fn is_busy(&self, direction: Direction) -> bool {
        match self.channel(direction) {
            Some(channel) => self.regs.read(channel + DMASR) & SR_IDLE == 0,
            None => false,
        }
    }

    fn reset(&mut self) -> Result<(), InitError> {
        // Resetting through MM2S resets the whole engine.
        self.regs.write(MM2S + DMACR, CR_RESET);

        for _ in 0..RESET_TIMEOUT {
            if self.regs.read(MM2S + DMACR) & CR_RESET == 0 {
                debug!("axi dma {} reset", self.config.device_id);
                return Ok(());
            }
        }

        Err(InitError::ResetTimeout)
    }
}
