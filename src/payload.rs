//! Where the staged words come from.

use zerocopy::AsBytes;

use crate::buffer::{PayloadError, WORD_BYTES};

/// A read-only run of words to be copied into the staging buffer.
pub trait PayloadSource {
    /// Number of words this source yields.
    fn word_len(&self) -> usize;

    /// Fill `words`, whose length is exactly `word_len()`.
    fn copy_to(&self, words: &mut [u32]);
}

impl PayloadSource for [u32] {
    fn word_len(&self) -> usize {
        self.len()
    }

    fn copy_to(&self, words: &mut [u32]) {
        words.copy_from_slice(self);
    }
}

impl<const N: usize> PayloadSource for [u32; N] {
    fn word_len(&self) -> usize {
        N
    }

    fn copy_to(&self, words: &mut [u32]) {
        words.copy_from_slice(self);
    }
}

/// A little-endian byte image, e.g. an `include_bytes!` asset.
#[derive(Debug, Clone, Copy)]
pub struct LeBytes<'a> {
    bytes: &'a [u8],
}

impl<'a> LeBytes<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, PayloadError> {
        if bytes.len() % WORD_BYTES == 0 {
            Ok(Self { bytes })
        } else {
            Err(PayloadError::PartialWord { len: bytes.len() })
        }
    }
}

impl PayloadSource for LeBytes<'_> {
    fn word_len(&self) -> usize {
        self.bytes.len() / WORD_BYTES
    }

    fn copy_to(&self, words: &mut [u32]) {
        words.as_bytes_mut().copy_from_slice(self.bytes);
        for word in words.iter_mut() {
            *word = u32::from_le(*word);
        }
    }
}

/// Synthetic `0x00RRGGBB` frame for bring-up without an image asset:
/// red ramps along x, green along y, blue is an XOR checkerboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPattern {
    pub width: usize,
    pub height: usize,
}

impl TestPattern {
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        let ramp = |pos: usize, span: usize| (pos * 255 / span.saturating_sub(1).max(1)) as u32;
        let r = ramp(x, self.width);
        let g = ramp(y, self.height);
        let b = ((x ^ y) & 0xFF) as u32;
        (r << 16) | (g << 8) | b
    }
}

impl PayloadSource for TestPattern {
    /// `usize::MAX` when the frame is too large to address, which no
    /// buffer can match.
    fn word_len(&self) -> usize {
        self.width.checked_mul(self.height).unwrap_or(usize::MAX)
    }

    fn copy_to(&self, words: &mut [u32]) {
        if self.width == 0 {
            return;
        }
        for (row, line) in words.chunks_exact_mut(self.width).enumerate() {
            for (col, word) in line.iter_mut().enumerate() {
                *word = self.pixel(col, row);
            }
        }
    }
}
