//! `unsafe` traits for buffers usable as the source of a DMA transfer.
//!
//! Only the memory-to-device direction exists in this crate, so there is
//! no write-side counterpart. The `'static` requirement is not expressed
//! here; `TransferController` enforces it on the buffer owner instead.

use as_slice::AsSlice;
use core::{mem, ops::Deref};
use stable_deref_trait::StableDeref;

/// Trait for buffers that can be given to DMA for reading.
///
/// # Safety
///
/// The implementing type must be safe to use for DMA reads. This means:
///
/// - It must be a pointer that references the actual buffer.
/// - The requirements documented on `dma_read_buffer` must be fulfilled.
pub unsafe trait DmaReadBuffer {
    type Word: DmaWord;

    /// Provide a buffer usable for DMA reads.
    ///
    /// The return value is:
    ///
    /// - pointer to the first word of the buffer
    /// - buffer size in bytes
    ///
    /// # Safety
    ///
    /// - This function must always return the same values, if called multiple
    ///   times.
    /// - The memory specified by the returned pointer and size must be fully
    ///   readable by the DMA peripheral.
    fn dma_read_buffer(&self) -> (*const Self::Word, usize);
}

/// Element type of a DMA source buffer.
///
/// # Safety
///
/// Implementors must not contain padding bytes: the engine reads every
/// byte of the buffer, and uninitialized padding would be sent to the
/// device.
pub unsafe trait DmaWord: Copy {}

unsafe impl DmaWord for u8 {}
unsafe impl DmaWord for u16 {}
unsafe impl DmaWord for u32 {}
unsafe impl DmaWord for u64 {}

// Same limitation as upstream: a blanket impl based on `AsRef<[E]>` would
// leave `E` unconstrained, so we go through `AsSlice` instead.

unsafe impl<B, E> DmaReadBuffer for B
where
    B: Deref + StableDeref,
    B::Target: AsSlice<Element = E>,
    E: DmaWord,
{
    type Word = E;

    fn dma_read_buffer(&self) -> (*const E, usize) {
        let target = self.as_slice();
        let ptr = target.as_ptr();
        let len = mem::size_of_val(target);
        (ptr, len)
    }
}
