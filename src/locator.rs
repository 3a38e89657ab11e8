//! Resolving a DMA engine's configuration from a device id.

use crate::axi::AxiDmaConfig;

pub trait DeviceLocator {
    type Config;

    /// `None` when no engine with `device_id` exists in this design.
    fn lookup(&self, device_id: u32) -> Option<Self::Config>;
}

/// Linear lookup in a table generated from the hardware design.
#[derive(Debug, Clone, Copy)]
pub struct ConfigTable<'a> {
    entries: &'a [AxiDmaConfig],
}

impl<'a> ConfigTable<'a> {
    pub const fn new(entries: &'a [AxiDmaConfig]) -> Self {
        Self { entries }
    }
}

impl DeviceLocator for ConfigTable<'_> {
    type Config = AxiDmaConfig;

    fn lookup(&self, device_id: u32) -> Option<AxiDmaConfig> {
        self.entries
            .iter()
            .find(|config| config.device_id() == device_id)
            .copied()
    }
}
