//! Status events emitted by the transfer controller.

use core::fmt;

use log::{error, info, warn};

/// One reportable step of bring-up or of a transfer attempt.
///
/// The wording produced by `Display` is for humans; tests should match on
/// the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    DmaConfigMissing { device_id: u32 },
    DmaInitOk,
    DmaInitFailed { code: u32 },
    StagingFailed { code: u32 },
    TransferStarted { attempt: u32 },
    TransferStartFailed { code: u32 },
    TransferCompleted { polls: u32 },
    TransferTimedOut { polls: u32 },
    ChannelReset,
    ChannelResetFailed { code: u32 },
}

impl Event {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::DmaConfigMissing { .. }
                | Self::DmaInitFailed { .. }
                | Self::StagingFailed { .. }
                | Self::TransferStartFailed { .. }
                | Self::TransferTimedOut { .. }
                | Self::ChannelResetFailed { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DmaConfigMissing { device_id } => {
                write!(f, "DMA config lookup failed (device {})", device_id)
            }
            Self::DmaInitOk => f.write_str("DMA init success"),
            Self::DmaInitFailed { code } => write!(f, "DMA init failed - {:x}", code),
            Self::StagingFailed { code } => write!(f, "DMA buffer staging failed - {:x}", code),
            Self::TransferStarted { attempt } => write!(f, "DMA transfer {} started", attempt),
            Self::TransferStartFailed { code } => write!(f, "DMA transfer failed - {:x}", code),
            Self::TransferCompleted { polls } => {
                write!(f, "DMA transfer completed successfully ({} polls)", polls)
            }
            Self::TransferTimedOut { polls } => {
                write!(f, "DMA transfer timed out after {} polls", polls)
            }
            Self::ChannelReset => f.write_str("DMA channel reset"),
            Self::ChannelResetFailed { code } => write!(f, "DMA channel reset failed - {:x}", code),
        }
    }
}

/// Receives controller events in the order they happen.
pub trait DiagnosticSink {
    fn record(&mut self, event: Event);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn record(&mut self, event: Event) {
        (**self).record(event)
    }
}

/// Forwards events to the `log` facade.
///
/// Per-attempt successes go out at `info`, which floods the log at frame
/// rate; raise the max level to `warn` on a running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, event: Event) {
        match event {
            Event::ChannelReset => warn!("{}", event),
            e if e.is_failure() => error!("{}", e),
            e => info!("{}", e),
        }
    }
}
