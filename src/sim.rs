//! In-memory stand-ins for the hardware collaborators.
//!
//! Used by the tests, and handy for host-side bring-up of code that drives a
//! `TransferController` without an FPGA attached. Nothing here moves data;
//! the simulated engine only fingerprints what it would have sent.

use core::cell::Cell;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::{
    cache::CacheMaintenance,
    diag::{DiagnosticSink, Event},
    engine::{DmaEngine, Direction, InitError, StartError},
    locator::DeviceLocator,
};

/// Shared logical clock, used to check the order of operations across
/// several doubles.
#[derive(Debug, Default)]
pub struct Timeline {
    now: Cell<u32>,
}

impl Timeline {
    pub const fn new() -> Self {
        Self { now: Cell::new(0) }
    }

    pub fn tick(&self) -> u32 {
        let now = self.now.get() + 1;
        self.now.set(now);
        now
    }
}

fn tick(timeline: Option<&Timeline>) -> u32 {
    timeline.map_or(0, Timeline::tick)
}

/// How the simulated engine answers one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Busy {
    /// Report busy for this many checks, idle on the next one.
    For(u32),
    /// Never finish.
    Forever,
    /// Refuse to start.
    Reject(StartError),
}

/// Behaviour of a `SimEngine`, one `Busy` entry per attempt. The last
/// entry repeats for all later attempts.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig<'t> {
    script: &'t [Busy],
    timeline: Option<&'t Timeline>,
    init_error: Option<InitError>,
    reset_error: Option<InitError>,
}

impl<'t> SimConfig<'t> {
    pub const fn new(script: &'t [Busy]) -> Self {
        Self {
            script,
            timeline: None,
            init_error: None,
            reset_error: None,
        }
    }

    pub const fn with_timeline(mut self, timeline: &'t Timeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub const fn failing_init(mut self, error: InitError) -> Self {
        self.init_error = Some(error);
        self
    }

    pub const fn failing_reset(mut self, error: InitError) -> Self {
        self.reset_error = Some(error);
        self
    }
}

/// Resolves exactly one device id.
#[derive(Debug, Clone, Copy)]
pub struct SimLocator<'t> {
    device_id: u32,
    config: SimConfig<'t>,
}

impl<'t> SimLocator<'t> {
    pub const fn new(device_id: u32, config: SimConfig<'t>) -> Self {
        Self { device_id, config }
    }
}

impl<'t> DeviceLocator for SimLocator<'t> {
    type Config = SimConfig<'t>;

    fn lookup(&self, device_id: u32) -> Option<SimConfig<'t>> {
        (device_id == self.device_id).then_some(self.config)
    }
}

/// A DMA engine that takes a scripted amount of polls per transfer.
pub struct SimEngine<'t> {
    config: SimConfig<'t>,
    in_flight: Cell<bool>,
    remaining: Cell<Option<u32>>,
    checks: Cell<u32>,
    total_checks: Cell<u64>,
    starts: u32,
    rejected: u32,
    resets: u32,
    overlapped: bool,
    first_start_at: Option<u32>,
    last_start: Option<(usize, usize)>,
    last_digest: Option<u32>,
    payload_changed: bool,
}

impl<'t> SimEngine<'t> {
    fn script_entry(&self) -> Busy {
        let index = (self.starts + self.rejected) as usize;
        match self.config.script {
            [] => Busy::For(0),
            script => script[index.min(script.len() - 1)],
        }
    }

    /// Transfers accepted so far.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// `is_busy` calls since the most recent start.
    pub fn checks_this_transfer(&self) -> u32 {
        self.checks.get()
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks.get()
    }

    /// Set if a start was requested while a transfer was still running.
    pub fn overlapped(&self) -> bool {
        self.overlapped
    }

    pub fn first_start_at(&self) -> Option<u32> {
        self.first_start_at
    }

    /// Source address and length of the most recent accepted start.
    pub fn last_start(&self) -> Option<(usize, usize)> {
        self.last_start
    }

    /// CRC-32 of the bytes the most recent transfer would have sent.
    pub fn last_digest(&self) -> Option<u32> {
        self.last_digest
    }

    /// Set if two transfers sent different bytes.
    pub fn payload_changed(&self) -> bool {
        self.payload_changed
    }
}

impl<'t> DmaEngine for SimEngine<'t> {
    type Config = SimConfig<'t>;

    fn initialize(config: SimConfig<'t>) -> Result<Self, InitError> {
        if let Some(error) = config.init_error {
            return Err(error);
        }
        Ok(Self {
            config,
            in_flight: Cell::new(false),
            remaining: Cell::new(None),
            checks: Cell::new(0),
            total_checks: Cell::new(0),
            starts: 0,
            rejected: 0,
            resets: 0,
            overlapped: false,
            first_start_at: None,
            last_start: None,
            last_digest: None,
            payload_changed: false,
        })
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
        if self.in_flight.get() {
            self.overlapped = true;
            return Err(StartError::Busy);
        }

        let remaining = match self.script_entry() {
            Busy::Reject(error) => {
                self.rejected += 1;
                return Err(error);
            }
            Busy::For(polls) => Some(polls),
            Busy::Forever => None,
        };

        // SAFETY: the caller keeps `len` bytes at `source` valid for the
        // whole transfer, which includes this call.
        let bytes = unsafe { core::slice::from_raw_parts(source, len) };
        let digest = crc32fast::hash(bytes);
        if self.last_digest.is_some_and(|last| last != digest) {
            self.payload_changed = true;
        }
        self.last_digest = Some(digest);

        let at = tick(self.config.timeline);
        self.first_start_at.get_or_insert(at);
        self.last_start = Some((source as usize, len));
        self.starts += 1;
        self.checks.set(0);
        self.remaining.set(remaining);
        self.in_flight.set(true);
        Ok(())
    }

    fn is_busy(&self, direction: Direction) -> bool {
        if direction != Direction::MemoryToDevice {
            return false;
        }
        self.checks.set(self.checks.get() + 1);
        self.total_checks.set(self.total_checks.get() + 1);

        if !self.in_flight.get() {
            return false;
        }
        match self.remaining.get() {
            Some(0) => {
                self.in_flight.set(false);
                false
            }
            Some(n) => {
                self.remaining.set(Some(n - 1));
                true
            }
            None => true,
        }
    }

    fn reset(&mut self) -> Result<(), InitError> {
        self.resets += 1;
        self.in_flight.set(false);
        tick(self.config.timeline);
        match self.config.reset_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Remembers every range it was asked to clean.
#[derive(Debug, Default)]
pub struct RecordingCache<'t> {
    timeline: Option<&'t Timeline>,
    cleans: Vec<(usize, usize, u32), 8>,
}

impl<'t> RecordingCache<'t> {
    pub fn new(timeline: Option<&'t Timeline>) -> Self {
        Self {
            timeline,
            cleans: Vec::new(),
        }
    }

    /// `(address, length, timeline tick)` per clean.
    pub fn cleans(&self) -> &[(usize, usize, u32)] {
        &self.cleans
    }
}

impl CacheMaintenance for RecordingCache<'_> {
    fn clean_range(&mut self, addr: *const u8, len: usize) {
        let at = tick(self.timeline);
        // Only the first few are interesting.
        let _ = self.cleans.push((addr as usize, len, at));
    }
}

/// A delay that returns immediately and keeps count.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingDelay {
    calls: u64,
    total_ns: u64,
}

impl CountingDelay {
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn total_us(&self) -> u64 {
        self.total_ns / 1_000
    }
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.calls += 1;
        self.total_ns += u64::from(us) * 1_000;
    }
}

/// Keeps the first `N` events.
#[derive(Debug, Default)]
pub struct RecordingSink<const N: usize> {
    events: Vec<Event, N>,
    dropped: usize,
}

impl<const N: usize> RecordingSink<N> {
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            dropped: 0,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events that did not fit.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl<const N: usize> DiagnosticSink for RecordingSink<N> {
    fn record(&mut self, event: Event) {
        if self.events.push(event).is_err() {
            self.dropped += 1;
        }
    }
}
