//! Streams a staged image to an FPGA-side consumer through an AXI DMA
//! engine, polling each transfer to completion with a bounded budget.
//!
//! The pieces, leaf first:
//!
//! - [`StagingBuffer`]: the 32-byte aligned word buffer the engine reads.
//! - [`CacheMaintenance`]: cleans the buffer out of the data cache.
//! - [`DmaEngine`]: start/is-busy/reset on one channel; [`AxiDma`] drives
//!   the real registers, [`sim::SimEngine`] stands in for it.
//! - [`TransferController`]: brings everything up once and then sends the
//!   buffer in a loop.

#![cfg_attr(not(test), no_std)]

mod traits;

pub mod axi;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod controller;
pub mod delay;
pub mod diag;
pub mod engine;
pub mod locator;
pub mod payload;
pub mod platform;
pub mod sim;

pub use axi::{AxiDma, AxiDmaConfig, Mmio, RegisterAccess};
pub use buffer::{PayloadError, StagingBuffer};
pub use cache::{CacheMaintenance, CoherentPort};
pub use config::{ControllerConfig, FailurePolicy};
pub use controller::{Fault, Outcome, State, TransferAttempt, TransferController};
pub use delay::SpinDelay;
pub use diag::{DiagnosticSink, Event, LogSink};
pub use engine::{DmaEngine, Direction, InitError, StartError};
pub use locator::{ConfigTable, DeviceLocator};
pub use payload::{LeBytes, PayloadSource, TestPattern};
pub use traits::{DmaReadBuffer, DmaWord};

#[cfg(target_arch = "aarch64")]
pub use cache::Aarch64DataCache;
#[cfg(all(feature = "cortex-m", target_arch = "arm"))]
pub use cache::CortexMDataCache;
