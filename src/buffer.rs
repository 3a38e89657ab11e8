//! The staging buffer handed to the DMA engine.

use as_slice::{AsMutSlice, AsSlice};
use thiserror::Error;
use zerocopy::AsBytes;

use crate::payload::PayloadSource;

/// Required alignment of a DMA source buffer, in bytes.
pub const STAGING_ALIGN: usize = 32;

/// Size of one staged word, in bytes.
pub const WORD_BYTES: usize = core::mem::size_of::<u32>();

/// A fixed-length, 32-byte aligned run of `u32` words.
///
/// The buffer is large (one frame is ~692 KB), so it is meant to live in a
/// `static` and be handed around as `&'static mut StagingBuffer<N>` rather
/// than moved by value.
#[repr(C, align(32))]
pub struct StagingBuffer<const N: usize> {
    words: [u32; N],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    #[error("payload holds {actual} words, buffer expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("{len} bytes do not make up whole words")]
    PartialWord { len: usize },
}

impl<const N: usize> StagingBuffer<N> {
    pub const LEN: usize = N;

    pub const fn new() -> Self {
        Self { words: [0; N] }
    }

    /// Copy `payload` into the buffer word for word.
    pub fn populate<P: PayloadSource + ?Sized>(&mut self, payload: &P) -> Result<(), PayloadError> {
        populate(&mut self.words, payload)
    }

    /// The buffer contents as the device will see them.
    pub fn as_bytes(&self) -> &[u8] {
        self.words.as_bytes()
    }

    pub fn byte_len(&self) -> usize {
        N * WORD_BYTES
    }

    pub fn base_address(&self) -> usize {
        self.words.as_ptr() as usize
    }
}

/// Length-checked copy of `payload` into `words`.
pub fn populate<P: PayloadSource + ?Sized>(words: &mut [u32], payload: &P) -> Result<(), PayloadError> {
    if payload.word_len() != words.len() {
        return Err(PayloadError::LengthMismatch {
            expected: words.len(),
            actual: payload.word_len(),
        });
    }
    payload.copy_to(words);
    Ok(())
}

impl<const N: usize> Default for StagingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AsSlice for StagingBuffer<N> {
    type Element = u32;

    fn as_slice(&self) -> &[u32] {
        &self.words
    }
}

impl<const N: usize> AsMutSlice for StagingBuffer<N> {
    fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.words
    }
}
