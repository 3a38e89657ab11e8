//! Capability interface of a single DMA channel.

use thiserror::Error;

/// Status codes reported by the engine, numbered like the vendor's
/// standalone driver so that logged codes match its documentation.
pub mod status {
    pub const FAILURE: u32 = 1;
    pub const DEVICE_NOT_FOUND: u32 = 2;
    pub const DMA_ERROR: u32 = 9;
    pub const INVALID_PARAM: u32 = 15;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Memory-mapped to stream (processor memory → device).
    MemoryToDevice,
    /// Stream to memory-mapped. Only ever queried, never started.
    DeviceToMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    #[error("configuration is invalid for this engine")]
    InvalidConfig,
    #[error("channel did not come out of reset")]
    ResetTimeout,
    #[error("engine reported status {0:#x}")]
    Hardware(u32),
}

impl InitError {
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidConfig => status::INVALID_PARAM,
            Self::ResetTimeout => status::DMA_ERROR,
            Self::Hardware(code) => *code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    #[error("channel is busy with an unfinished transfer")]
    Busy,
    #[error("transfer length {0} is out of range")]
    InvalidLength(usize),
    #[error("source address {0:#x} is misaligned")]
    Misaligned(usize),
    #[error("source range at {0:#x} is beyond the engine's address width")]
    AddressOutOfRange(usize),
    #[error("channel does not support this direction")]
    Unsupported,
    #[error("engine halted with status {0:#010x}")]
    Halted(u32),
}

impl StartError {
    pub fn code(&self) -> u32 {
        match self {
            Self::Busy | Self::Halted(_) => status::FAILURE,
            Self::InvalidLength(_)
            | Self::Misaligned(_)
            | Self::AddressOutOfRange(_)
            | Self::Unsupported => status::INVALID_PARAM,
        }
    }
}

/// An initialized binding to one hardware DMA channel.
pub trait DmaEngine: Sized {
    /// Configuration handle resolved by a `DeviceLocator`.
    type Config;

    /// Bind and reset the channel. Called exactly once per engine.
    fn initialize(config: Self::Config) -> Result<Self, InitError>;

    /// Kick off a one-shot transfer of `len` bytes starting at `source`.
    ///
    /// Returns as soon as the engine accepted the request; completion is
    /// observed through `is_busy`.
    ///
    /// # Safety
    ///
    /// The `len` bytes at `source` must stay valid and unmodified until
    /// `is_busy(direction)` has returned `false` or the channel has been
    /// reset.
    unsafe fn start_transfer(
        &mut self,
        source: *const u8,
        len: usize,
        direction: Direction,
    ) -> Result<(), StartError>;

    /// `false` once the most recent transfer in `direction` has finished.
    fn is_busy(&self, direction: Direction) -> bool;

    /// Soft-reset the channel, aborting anything in flight.
    fn reset(&mut self) -> Result<(), InitError>;
}
