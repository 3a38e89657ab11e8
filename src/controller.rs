//! The transfer controller: bring the engine up, then send the staging
//! buffer to the device over and over.

use as_slice::{AsMutSlice, AsSlice};
use core::{
    ops::DerefMut,
    sync::atomic::{self, Ordering},
};
use embedded_hal::delay::DelayNs;
use log::{debug, error};
use stable_deref_trait::StableDeref;
use thiserror::Error;

use crate::{
    buffer::{self, PayloadError, STAGING_ALIGN},
    cache::CacheMaintenance,
    config::{ControllerConfig, FailurePolicy},
    diag::{DiagnosticSink, Event},
    engine::{status, DmaEngine, Direction, InitError, StartError},
    locator::DeviceLocator,
    payload::PayloadSource,
    traits::DmaReadBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Uninitialized,
    Ready,
    InFlight,
    Completed,
    TimedOut,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Completed { polls: u32 },
    TimedOut { polls: u32 },
    StartRejected(StartError),
}

/// Record of one send, handed back to the caller once it has reached an
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferAttempt {
    pub direction: Direction,
    pub source: usize,
    pub len: usize,
    pub outcome: Outcome,
}

/// Reasons the controller stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    #[error("no DMA engine configured for device {device_id}")]
    ConfigMissing { device_id: u32 },
    #[error("DMA engine initialization failed: {0}")]
    Init(InitError),
    #[error("staging buffer not populated: {0}")]
    Payload(PayloadError),
    #[error("staging buffer at {0:#x} is not 32-byte aligned")]
    MisalignedBuffer(usize),
    #[error("transfer start rejected: {0}")]
    Start(StartError),
    #[error("transfer still busy after {polls} polls")]
    TimedOut { polls: u32 },
    #[error("channel reset failed: {0}")]
    Reset(InitError),
    #[error("controller has not been brought up")]
    NotReady,
    #[error("controller was already brought up")]
    AlreadyInitialized,
    #[error("controller is halted")]
    Halted,
}

impl Fault {
    /// Numeric status in the engine's numbering.
    pub fn code(&self) -> u32 {
        match self {
            Self::ConfigMissing { .. } => status::DEVICE_NOT_FOUND,
            Self::Init(e) | Self::Reset(e) => e.code(),
            Self::Start(e) => e.code(),
            Self::MisalignedBuffer(_) | Self::Payload(_) => status::INVALID_PARAM,
            Self::TimedOut { .. } => status::DMA_ERROR,
            Self::NotReady | Self::AlreadyInitialized | Self::Halted => status::FAILURE,
        }
    }
}

/// Owns the staging buffer and the DMA engine bound to it.
///
/// `B` is any address-stable `'static` owner of the word buffer, typically
/// `&'static mut StagingBuffer<N>`. The `'static` bound matters: after a
/// timeout the engine may still be reading the buffer, so it must never be
/// handed back to the caller.
pub struct TransferController<E: DmaEngine, B, C, D, S: DiagnosticSink> {
    // `Some` from a successful `bring_up` on
    engine: Option<E>,
    buffer: B,
    cache: C,
    delay: D,
    sink: S,
    config: ControllerConfig,
    state: State,
    attempts: u32,
    failure_streak: u32,
}

impl<E, B, C, D, S> TransferController<E, B, C, D, S>
where
    E: DmaEngine,
    B: DerefMut + StableDeref + 'static,
    B::Target: AsMutSlice<Element = u32>,
    C: CacheMaintenance,
    D: DelayNs,
    S: DiagnosticSink,
{
    pub fn new(buffer: B, cache: C, delay: D, sink: S, config: ControllerConfig) -> Self {
        Self {
            engine: None,
            buffer,
            cache,
            delay,
            sink,
            config,
            state: State::Uninitialized,
            attempts: 0,
            failure_streak: 0,
        }
    }

    /// Resolve and initialize the engine, stage `payload` and make it
    /// visible to the engine. Allowed once.
    pub fn bring_up<L, P>(&mut self, locator: &L, device_id: u32, payload: &P) -> Result<(), Fault>
    where
        L: DeviceLocator<Config = E::Config>,
        P: PayloadSource + ?Sized,
    {
        if self.state != State::Uninitialized {
            return Err(Fault::AlreadyInitialized);
        }

        let Some(dma_config) = locator.lookup(device_id) else {
            self.sink.record(Event::DmaConfigMissing { device_id });
            return Err(self.halt(Fault::ConfigMissing { device_id }));
        };

        match E::initialize(dma_config) {
            Ok(engine) => {
                self.engine = Some(engine);
                self.sink.record(Event::DmaInitOk);
            }
            Err(e) => {
                self.sink.record(Event::DmaInitFailed { code: e.code() });
                return Err(self.halt(Fault::Init(e)));
            }
        }

        let (source, len) = self.buffer.dma_read_buffer();
        if source as usize % STAGING_ALIGN != 0 {
            return Err(self.staging_failed(Fault::MisalignedBuffer(source as usize)));
        }

        if let Err(e) = buffer::populate(self.buffer.as_mut_slice(), payload) {
            return Err(self.staging_failed(Fault::Payload(e)));
        }
        debug!("staged {} words at {:#x}", payload.word_len(), source as usize);

        self.cache.clean_range(source.cast(), len);
        self.state = State::Ready;
        Ok(())
    }

    /// Send the buffer once and wait for the outcome.
    ///
    /// Under `ResetAndRetry` a failed attempt is returned as `Ok` with its
    /// outcome, as long as the channel could be reset and the failure streak
    /// is within bounds.
    pub fn run_once(&mut self) -> Result<TransferAttempt, Fault> {
        match self.state {
            State::Uninitialized => return Err(Fault::NotReady),
            State::Halted => return Err(Fault::Halted),
            _ => {}
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(Fault::NotReady);
        };

        self.attempts = self.attempts.wrapping_add(1);
        let (source, len) = self.buffer.dma_read_buffer();
        let mut attempt = TransferAttempt {
            direction: Direction::MemoryToDevice,
            source: source as usize,
            len,
            outcome: Outcome::Completed { polls: 0 },
        };

        // Keep the staging writes and cache clean ahead of the start.
        atomic::compiler_fence(Ordering::Release);

        // SAFETY: the buffer is a `'static` address-stable allocation owned
        // by `self` and never written after `bring_up`, so it outlives the
        // transfer and stays unmodified while the engine reads it.
        let started = unsafe { engine.start_transfer(source.cast(), len, Direction::MemoryToDevice) };
        if let Err(e) = started {
            self.sink.record(Event::TransferStartFailed { code: e.code() });
            attempt.outcome = Outcome::StartRejected(e);
            return self.recover(attempt, Fault::Start(e));
        }
        self.sink.record(Event::TransferStarted {
            attempt: self.attempts,
        });
        self.state = State::InFlight;

        match poll_until_idle(
            &*engine,
            &mut self.delay,
            self.config.poll_budget,
            self.config.poll_interval_us,
        ) {
            Ok(polls) => {
                atomic::compiler_fence(Ordering::Acquire);
                self.state = State::Completed;
                self.failure_streak = 0;
                self.sink.record(Event::TransferCompleted { polls });
                attempt.outcome = Outcome::Completed { polls };
                Ok(attempt)
            }
            Err(polls) => {
                self.state = State::TimedOut;
                self.sink.record(Event::TransferTimedOut { polls });
                attempt.outcome = Outcome::TimedOut { polls };
                self.recover(attempt, Fault::TimedOut { polls })
            }
        }
    }

    /// Run `attempts` send cycles, stopping early on a fault.
    pub fn run_for(&mut self, attempts: usize) -> Result<(), Fault> {
        for _ in 0..attempts {
            self.run_once()?;
        }
        Ok(())
    }

    /// The service loop. Only returns when the controller halts.
    pub fn run(&mut self) -> Fault {
        loop {
            if let Err(fault) = self.run_once() {
                return fault;
            }
        }
    }

    fn recover(&mut self, attempt: TransferAttempt, fault: Fault) -> Result<TransferAttempt, Fault> {
        let max = match self.config.policy {
            FailurePolicy::FailStop => return Err(self.halt(fault)),
            FailurePolicy::ResetAndRetry {
                max_consecutive_failures,
            } => max_consecutive_failures,
        };

        self.failure_streak = self.failure_streak.saturating_add(1);
        if self.failure_streak > max {
            return Err(self.halt(fault));
        }

        let Some(engine) = self.engine.as_mut() else {
            return Err(self.halt(Fault::NotReady));
        };
        match engine.reset() {
            Ok(()) => {
                self.sink.record(Event::ChannelReset);
                Ok(attempt)
            }
            Err(e) => {
                self.sink.record(Event::ChannelResetFailed { code: e.code() });
                Err(self.halt(Fault::Reset(e)))
            }
        }
    }

    fn staging_failed(&mut self, fault: Fault) -> Fault {
        self.sink.record(Event::StagingFailed { code: fault.code() });
        self.halt(fault)
    }

    fn halt(&mut self, fault: Fault) -> Fault {
        error!("transfer controller halted: {}", fault);
        self.state = State::Halted;
        fault
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Number of transfers attempted so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn buffer(&self) -> &[u32] {
        self.buffer.as_slice()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<E: DmaEngine, B, C, D, S: DiagnosticSink> Drop for TransferController<E, B, C, D, S> {
    fn drop(&mut self) {
        // The buffer owner may release the memory once we are gone, so a
        // transfer left running after a timeout has to be stopped first.
        if let Some(engine) = self.engine.as_mut() {
            if engine.is_busy(Direction::MemoryToDevice) {
                match engine.reset() {
                    Ok(()) => self.sink.record(Event::ChannelReset),
                    Err(e) => {
                        error!("channel still running on drop: {}", e);
                        self.sink.record(Event::ChannelResetFailed { code: e.code() });
                    }
                }
            }
        }
        atomic::compiler_fence(Ordering::Acquire);
    }
}

/// Check `is_busy` up to `budget` times, waiting `interval_us` after every
/// busy answer. `Ok(n)` when the `n`-th check found the channel idle,
/// `Err(budget)` when every check found it busy.
pub fn poll_until_idle<E, D>(engine: &E, delay: &mut D, budget: u32, interval_us: u32) -> Result<u32, u32>
where
    E: DmaEngine,
    D: DelayNs,
{
    for poll in 1..=budget {
        if !engine.is_busy(Direction::MemoryToDevice) {
            return Ok(poll);
        }
        delay.delay_us(interval_us);
    }
    Err(budget)
}
