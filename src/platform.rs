//! ZCU102 reference design: one AXI DMA feeding the inference core.

use crate::{axi::AxiDmaConfig, locator::ConfigTable};

/// Words in one frame: 416 × 416 pixels, one word each.
pub const IMG_LENGTH: usize = 173_056;

pub const DDR_BASE_ADDR: usize = 0x0000_0000;
pub const MEM_BASE_ADDR: usize = DDR_BASE_ADDR + 0x0100_0000;
/// Start of the `TX_BUFFER` region in `memory.x`, which holds nothing but
/// the staging frame (section `.tx_buffer`).
pub const TX_BUFFER_BASE: usize = MEM_BASE_ADDR + 0x0010_0000;
/// Size of the `TX_BUFFER` region.
pub const TX_BUFFER_LEN: usize = 0x0010_0000;

const _: () = assert!(IMG_LENGTH * 4 <= TX_BUFFER_LEN);

pub const DMA_DEV_ID: u32 = 0;
pub const DMA_BASE_ADDR: usize = 0xA000_0000;

// SAFETY: the AXI DMA sits at this address in the PL address map of the
// reference design and nothing else in the firmware touches it.
static DMA_CONFIGS: [AxiDmaConfig; 1] = unsafe {
    [AxiDmaConfig::new(DMA_DEV_ID, DMA_BASE_ADDR)
        .with_mm2s(true, 32, false)
        .with_s2mm(false)
        .with_length_width(26)
        .with_addr_width(32)]
};

pub fn dma_configs() -> ConfigTable<'static> {
    ConfigTable::new(&DMA_CONFIGS)
}

/// Whether `len` bytes at `addr` lie inside the reserved TX buffer region.
pub fn in_tx_buffer(addr: usize, len: usize) -> bool {
    let end = TX_BUFFER_BASE + TX_BUFFER_LEN;
    addr >= TX_BUFFER_BASE && addr.checked_add(len).is_some_and(|last| last <= end)
}
