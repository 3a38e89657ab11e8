//! Transfer controller behaviour against the simulated engine.

use fpga_dma_tx::{
    buffer::StagingBuffer,
    controller::poll_until_idle,
    engine::status,
    sim::{Busy, CountingDelay, RecordingCache, RecordingSink, SimConfig, SimEngine, SimLocator, Timeline},
    ControllerConfig, Direction, DmaEngine, Event, FailurePolicy, Fault, InitError, Outcome, PayloadError,
    StartError, State, TestPattern, TransferController,
};

type Sink = RecordingSink<64>;
type Controller<'t, 's, const N: usize> = TransferController<
    SimEngine<'t>,
    &'static mut StagingBuffer<N>,
    RecordingCache<'t>,
    CountingDelay,
    &'s mut Sink,
>;

const PAYLOAD: [u32; 4] = [0x1, 0x2, 0x3, 0x4];

fn staging<const N: usize>() -> &'static mut StagingBuffer<N> {
    Box::leak(Box::new(StagingBuffer::new()))
}

fn controller<'t, 's>(
    timeline: Option<&'t Timeline>,
    sink: &'s mut Sink,
    config: ControllerConfig,
) -> Controller<'t, 's, 4> {
    TransferController::new(
        staging(),
        RecordingCache::new(timeline),
        CountingDelay::default(),
        sink,
        config,
    )
}

fn events<'a>(ctl: &'a Controller<'_, '_, 4>) -> &'a [Event] {
    ctl.sink().events()
}

#[test]
fn scenario_a_sends_repeatedly() {
    let script = [Busy::For(2)];
    let locator = SimLocator::new(0, SimConfig::new(&script));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.state(), State::Ready);

    ctl.run_for(2).unwrap();
    assert_eq!(ctl.state(), State::Completed);
    assert_eq!(
        events(&ctl),
        &[
            Event::DmaInitOk,
            Event::TransferStarted { attempt: 1 },
            Event::TransferCompleted { polls: 3 },
            Event::TransferStarted { attempt: 2 },
            Event::TransferCompleted { polls: 3 },
        ]
    );

    let engine = ctl.engine().unwrap();
    assert_eq!(engine.starts(), 2);
    assert!(!engine.payload_changed());
    assert_eq!(ctl.attempts(), 2);
}

#[test]
fn scenario_b_missing_config_halts_silently() {
    let locator = SimLocator::new(3, SimConfig::new(&[]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    let fault = ctl.bring_up(&locator, 0, &PAYLOAD).unwrap_err();
    assert_eq!(fault, Fault::ConfigMissing { device_id: 0 });
    assert_eq!(fault.code(), status::DEVICE_NOT_FOUND);
    assert_eq!(ctl.state(), State::Halted);
    assert_eq!(ctl.run_once(), Err(Fault::Halted));
    assert_eq!(events(&ctl), &[Event::DmaConfigMissing { device_id: 0 }]);
    assert!(ctl.engine().is_none());
}

#[test]
fn scenario_c_timeout_halts_under_fail_stop() {
    let script = [Busy::Forever];
    let locator = SimLocator::new(0, SimConfig::new(&script));
    let mut sink = Sink::new();
    let config = ControllerConfig::new().with_poll_budget(50);
    let mut ctl = controller(None, &mut sink, config);

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    let fault = ctl.run();
    assert_eq!(fault, Fault::TimedOut { polls: 50 });
    assert_eq!(ctl.state(), State::Halted);

    assert_eq!(ctl.run_once(), Err(Fault::Halted));
    assert_eq!(
        events(&ctl),
        &[
            Event::DmaInitOk,
            Event::TransferStarted { attempt: 1 },
            Event::TransferTimedOut { polls: 50 },
        ]
    );
}

#[test]
fn init_failure_is_terminal() {
    let config = SimConfig::new(&[]).failing_init(InitError::Hardware(status::DMA_ERROR));
    let locator = SimLocator::new(0, config);
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    let fault = ctl.bring_up(&locator, 0, &PAYLOAD).unwrap_err();
    assert_eq!(fault, Fault::Init(InitError::Hardware(status::DMA_ERROR)));
    assert_eq!(events(&ctl), &[Event::DmaInitFailed { code: status::DMA_ERROR }]);
    assert_eq!(ctl.state(), State::Halted);
}

#[test]
fn payload_is_staged_word_for_word() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::For(0)]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.buffer(), &PAYLOAD);

    let attempt = ctl.run_once().unwrap();
    assert_eq!(attempt.len, 16);
    assert_eq!(attempt.source % 32, 0);
    assert_eq!(ctl.engine().unwrap().last_start(), Some((attempt.source, 16)));

    let expected = crc32fast::hash(&[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4, 0, 0, 0]);
    assert_eq!(ctl.engine().unwrap().last_digest(), Some(expected));
}

#[test]
fn payload_length_must_match_buffer() {
    let locator = SimLocator::new(0, SimConfig::new(&[]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    let fault = ctl.bring_up(&locator, 0, &[1u32, 2, 3]).unwrap_err();
    assert!(matches!(fault, Fault::Payload(_)));
    assert_eq!(ctl.state(), State::Halted);
    assert_eq!(
        events(&ctl),
        &[
            Event::DmaInitOk,
            Event::StagingFailed {
                code: status::INVALID_PARAM
            },
        ]
    );
}

#[test]
fn oversized_test_pattern_is_a_length_mismatch() {
    let locator = SimLocator::new(0, SimConfig::new(&[]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    let pattern = TestPattern {
        width: usize::MAX,
        height: 2,
    };
    let fault = ctl.bring_up(&locator, 0, &pattern).unwrap_err();
    assert_eq!(
        fault,
        Fault::Payload(PayloadError::LengthMismatch {
            expected: 4,
            actual: usize::MAX
        })
    );
    assert_eq!(ctl.buffer(), &[0, 0, 0, 0]);
}

#[test]
fn flush_happens_before_first_start() {
    let timeline = Timeline::new();
    let script = [Busy::For(1)];
    let locator = SimLocator::new(0, SimConfig::new(&script).with_timeline(&timeline));
    let mut cache = RecordingCache::new(Some(&timeline));
    let mut sink = Sink::new();
    let buffer = staging::<4>();
    let base = buffer.base_address();

    let mut ctl = TransferController::<SimEngine<'_>, _, _, _, _>::new(
        buffer,
        &mut cache,
        CountingDelay::default(),
        &mut sink,
        ControllerConfig::new(),
    );
    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    ctl.run_for(3).unwrap();
    let started = ctl.engine().unwrap().first_start_at().unwrap();
    drop(ctl);

    // One clean, covering the whole buffer, before anything was started.
    assert_eq!(cache.cleans().len(), 1);
    let (addr, len, cleaned) = cache.cleans()[0];
    assert_eq!((addr, len), (base, 16));
    assert!(cleaned < started);
}

#[test]
fn transfers_never_overlap() {
    let script = [Busy::For(5), Busy::For(0), Busy::For(17)];
    let locator = SimLocator::new(0, SimConfig::new(&script));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    ctl.run_for(10).unwrap();

    let engine = ctl.engine().unwrap();
    assert_eq!(engine.starts(), 10);
    assert!(!engine.overlapped());
}

#[test]
fn timeout_after_exactly_the_reference_budget() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::Forever]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::default());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run_once(), Err(Fault::TimedOut { polls: 1_000_000 }));
    assert_eq!(ctl.engine().unwrap().checks_this_transfer(), 1_000_000);
}

#[test]
fn immediate_completion_uses_one_poll() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::For(0)]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::default());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    let attempt = ctl.run_once().unwrap();
    assert_eq!(attempt.outcome, Outcome::Completed { polls: 1 });
    assert_eq!(ctl.engine().unwrap().checks_this_transfer(), 1);
}

#[test]
fn poll_waits_between_busy_checks() {
    let engine = SimEngine::initialize(SimConfig::new(&[Busy::For(4)])).unwrap();
    let mut delay = CountingDelay::default();

    // Nothing in flight yet: idle on the first check.
    assert_eq!(poll_until_idle(&engine, &mut delay, 10, 1), Ok(1));
    assert_eq!(delay.calls(), 0);

    let mut engine = engine;
    let word = [0u32; 1];
    unsafe {
        engine
            .start_transfer(word.as_ptr().cast(), 4, Direction::MemoryToDevice)
            .unwrap();
    }
    assert_eq!(poll_until_idle(&engine, &mut delay, 10, 1), Ok(5));
    assert_eq!(delay.calls(), 4);
    assert_eq!(delay.total_us(), 4);
}

#[test]
fn zero_budget_times_out_without_checking() {
    let engine = SimEngine::initialize(SimConfig::new(&[])).unwrap();
    let mut delay = CountingDelay::default();
    assert_eq!(poll_until_idle(&engine, &mut delay, 0, 1), Err(0));
    assert_eq!(engine.total_checks(), 0);
}

#[test]
fn retry_policy_resets_and_recovers() {
    let script = [Busy::Forever, Busy::Reject(StartError::Busy), Busy::For(1)];
    let locator = SimLocator::new(0, SimConfig::new(&script));
    let mut sink = Sink::new();
    let config = ControllerConfig::new()
        .with_poll_budget(10)
        .with_policy(FailurePolicy::ResetAndRetry {
            max_consecutive_failures: 2,
        });
    let mut ctl = controller(None, &mut sink, config);

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();

    let first = ctl.run_once().unwrap();
    assert_eq!(first.outcome, Outcome::TimedOut { polls: 10 });
    let second = ctl.run_once().unwrap();
    assert_eq!(second.outcome, Outcome::StartRejected(StartError::Busy));
    let third = ctl.run_once().unwrap();
    assert_eq!(third.outcome, Outcome::Completed { polls: 2 });

    assert_eq!(
        events(&ctl),
        &[
            Event::DmaInitOk,
            Event::TransferStarted { attempt: 1 },
            Event::TransferTimedOut { polls: 10 },
            Event::ChannelReset,
            Event::TransferStartFailed { code: status::FAILURE },
            Event::ChannelReset,
            Event::TransferStarted { attempt: 3 },
            Event::TransferCompleted { polls: 2 },
        ]
    );
    assert_eq!(ctl.engine().unwrap().resets(), 2);
    assert!(!ctl.engine().unwrap().overlapped());
}

#[test]
fn retry_policy_halts_after_too_many_failures() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::Forever]));
    let mut sink = Sink::new();
    let config = ControllerConfig::new()
        .with_poll_budget(3)
        .with_policy(FailurePolicy::ResetAndRetry {
            max_consecutive_failures: 2,
        });
    let mut ctl = controller(None, &mut sink, config);

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run(), Fault::TimedOut { polls: 3 });
    assert_eq!(ctl.state(), State::Halted);
    assert_eq!(ctl.attempts(), 3);
    assert_eq!(ctl.engine().unwrap().resets(), 2);
}

#[test]
fn retry_policy_halts_when_reset_fails() {
    let config = SimConfig::new(&[Busy::Forever]).failing_reset(InitError::ResetTimeout);
    let locator = SimLocator::new(0, config);
    let mut sink = Sink::new();
    let config = ControllerConfig::new()
        .with_poll_budget(1)
        .with_policy(FailurePolicy::ResetAndRetry {
            max_consecutive_failures: 5,
        });
    let mut ctl = controller(None, &mut sink, config);

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run_once(), Err(Fault::Reset(InitError::ResetTimeout)));
    assert_eq!(
        events(&ctl).last(),
        Some(&Event::ChannelResetFailed {
            code: status::DMA_ERROR
        })
    );
}

#[test]
fn start_rejection_halts_under_fail_stop() {
    let script = [Busy::Reject(StartError::InvalidLength(0))];
    let locator = SimLocator::new(0, SimConfig::new(&script));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run_once(), Err(Fault::Start(StartError::InvalidLength(0))));
    assert_eq!(
        events(&ctl),
        &[
            Event::DmaInitOk,
            Event::TransferStartFailed {
                code: status::INVALID_PARAM
            },
        ]
    );
    assert_eq!(ctl.state(), State::Halted);
}

#[test]
fn bring_up_runs_once() {
    let locator = SimLocator::new(0, SimConfig::new(&[]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    assert_eq!(ctl.run_once(), Err(Fault::NotReady));
    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(
        ctl.bring_up(&locator, 0, &PAYLOAD),
        Err(Fault::AlreadyInitialized)
    );
    assert_eq!(events(&ctl), &[Event::DmaInitOk]);
}

#[test]
fn misaligned_buffer_is_rejected() {
    #[repr(C, align(32))]
    struct Backing([u32; 5]);

    let backing: &'static mut Backing = Box::leak(Box::new(Backing([0; 5])));
    // Skip the first word to land 4 bytes past the alignment boundary.
    let words: &'static mut [u32; 4] = (&mut backing.0[1..]).try_into().unwrap();

    let locator = SimLocator::new(0, SimConfig::new(&[]));
    let mut sink = Sink::new();
    let mut ctl = TransferController::<SimEngine<'_>, _, _, _, _>::new(
        words,
        RecordingCache::new(None),
        CountingDelay::default(),
        &mut sink,
        ControllerConfig::new(),
    );

    let fault = ctl.bring_up(&locator, 0, &PAYLOAD).unwrap_err();
    assert!(matches!(fault, Fault::MisalignedBuffer(addr) if addr % 32 == 4));
    assert_eq!(ctl.state(), State::Halted);
    assert_eq!(
        ctl.sink().events(),
        &[
            Event::DmaInitOk,
            Event::StagingFailed {
                code: status::INVALID_PARAM
            },
        ]
    );
}

#[test]
fn drop_stops_a_running_transfer() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::Forever]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new().with_poll_budget(2));

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run_once(), Err(Fault::TimedOut { polls: 2 }));
    drop(ctl);

    assert_eq!(sink.events().last(), Some(&Event::ChannelReset));
}

#[test]
fn drop_reports_a_failed_reset() {
    let config = SimConfig::new(&[Busy::Forever]).failing_reset(InitError::ResetTimeout);
    let locator = SimLocator::new(0, config);
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new().with_poll_budget(2));

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    assert_eq!(ctl.run_once(), Err(Fault::TimedOut { polls: 2 }));
    drop(ctl);

    assert_eq!(
        sink.events().last(),
        Some(&Event::ChannelResetFailed {
            code: status::DMA_ERROR
        })
    );
}

#[test]
fn drop_after_completion_leaves_the_channel_alone() {
    let locator = SimLocator::new(0, SimConfig::new(&[Busy::For(0)]));
    let mut sink = Sink::new();
    let mut ctl = controller(None, &mut sink, ControllerConfig::new());

    ctl.bring_up(&locator, 0, &PAYLOAD).unwrap();
    ctl.run_once().unwrap();
    drop(ctl);

    assert_eq!(sink.events().last(), Some(&Event::TransferCompleted { polls: 1 }));
}
