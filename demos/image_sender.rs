//! Streams one frame to the accelerator, forever.
//!
//! Built for a Cortex-M7 host that shares the reference design's address
//! map, so the AXI DMA reads the frame straight out of the `TX_BUFFER`
//! region reserved in `memory.x`:
//!
//!     cargo build --release --features firmware --example image-sender \
//!         --target thumbv7em-none-eabihf
//!
//! Without an image asset the frame is a generated test pattern.

#![no_std]
#![no_main]

use core::{mem::MaybeUninit, ptr};

use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;
use fpga_dma_tx::{
    platform, AxiDma, ControllerConfig, CortexMDataCache, LogSink, SpinDelay, StagingBuffer,
    TestPattern, TransferController,
};
use log::{LevelFilter, Metadata, Record};
use panic_semihosting as _;

const CORE_HZ: u32 = 480_000_000;
const FRAME_SIDE: usize = 416;

type Frame = StagingBuffer<{ platform::IMG_LENGTH }>;

#[link_section = ".tx_buffer"]
static mut FRAME: MaybeUninit<Frame> = MaybeUninit::uninit();

struct SemihostingLogger;

impl log::Log for SemihostingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            hprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SemihostingLogger = SemihostingLogger;

#[entry]
fn main() -> ! {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
    hprintln!("Welcome from the main function");

    let Some(mut core) = cortex_m::Peripherals::take() else {
        hprintln!("core peripherals already taken");
        idle();
    };
    core.SCB.enable_icache();
    core.SCB.enable_dcache(&mut core.CPUID);

    let frame = take_frame();
    if !platform::in_tx_buffer(frame.base_address(), frame.byte_len()) {
        hprintln!("frame at {:#x} is outside the DMA region", frame.base_address());
        idle();
    }

    let mut controller = TransferController::<AxiDma, _, _, _, _>::new(
        frame,
        CortexMDataCache::new(core.SCB),
        SpinDelay::new(CORE_HZ),
        LogSink,
        ControllerConfig::default(),
    );

    let pattern = TestPattern {
        width: FRAME_SIDE,
        height: FRAME_SIDE,
    };
    if controller
        .bring_up(&platform::dma_configs(), platform::DMA_DEV_ID, &pattern)
        .is_ok()
    {
        let fault = controller.run();
        hprintln!("stopped: {}", fault);
    }

    idle();
}

/// Hands out the frame. Only called once, from `main`.
fn take_frame() -> &'static mut Frame {
    // SAFETY: `main` runs once and is the only user of `FRAME`. The section
    // is never zeroed by the runtime, so clear it before making a reference;
    // all-zero words are a valid `StagingBuffer`.
    unsafe {
        let frame = ptr::addr_of_mut!(FRAME).cast::<Frame>();
        ptr::write_bytes(frame, 0, 1);
        &mut *frame
    }
}

fn idle() -> ! {
    loop {
        continue;
    }
}
