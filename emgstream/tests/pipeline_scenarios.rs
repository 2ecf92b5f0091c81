//! End-to-end acquisition scenarios.
//!
//! The deterministic scenarios drive the sampler and framer from one thread
//! against a [`ManualClock`], so every run produces the same bytes. The
//! threaded ones go through [`Pipeline`] on the real clock.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=emgstream=debug cargo test --test pipeline_scenarios -- --nocapture
//! ```

use std::sync::Once;

use emgstream::data::{
    ByteStream, ByteStreamSink, Continuity, GapTracker, MemoryNotifier, Notification,
    NotificationSink, Readiness, StreamDecoder, TransportSink, decode_notification,
};
use emgstream::runtime::CpuConfig;
use emgstream::sync::spsc;
use emgstream::timing::{Clock, Duration, ManualClock, MonoClock};
use emgstream::{
    AdcWidth, AnalogInput, Attenuation, Calibration, ChannelConverter, CycleOutcome, Framer,
    FramerConfig, Pipeline, PipelineConfig, RunId, Sampler, SamplerConfig, SyntheticInput,
};

static INIT_TRACING: Once = Once::new();

fn init_test_tracing() {
    INIT_TRACING.call_once(emgstream::init_tracing);
}

/// Simulated ADC: each conversion takes 40 µs, and the code depends on the
/// grid cycle the read falls in, so decoded values reveal ordering.
struct GridAdc {
    clock: ManualClock,
}

const READ_COST_US: u64 = 40;

fn code(cycle: u64, channel: usize) -> u16 {
    ((cycle * 7 + channel as u64 * 500) % 4096) as u16
}

impl AnalogInput for GridAdc {
    fn read_raw(&mut self, channel: usize) -> u16 {
        let cycle = self.clock.now().as_u64() / 1000;
        self.clock.advance(Duration::from_micros(READ_COST_US));
        code(cycle, channel)
    }
}

fn converter() -> ChannelConverter {
    ChannelConverter::new(
        Calibration::characterize(1100, Attenuation::Db11, AdcWidth::BITS_12).unwrap(),
    )
}

/// Millivolt value the receiver should see for `cycle`/`channel`.
fn expected(cycle: u64, channel: usize) -> u16 {
    converter().convert(code(cycle, channel)).get() & 0x0FFF
}

fn simulated_sampler<const R: usize>(
    clock: &ManualClock,
    ring: spsc::SampleProducer<4, R>,
) -> Sampler<GridAdc, ManualClock, 4, R> {
    Sampler::new(
        GridAdc {
            clock: clock.clone(),
        },
        clock.clone(),
        converter(),
        ring,
        SamplerConfig::default(),
    )
    .unwrap()
}

#[test]
fn four_thousand_cycles_arrive_in_order() {
    init_test_tracing();
    let clock = ManualClock::new();
    let (tx, rx) = spsc::channel::<4, 1024>();
    let run_id = RunId(0x5EED);
    let mut sampler = simulated_sampler(&clock, tx);
    let mut framer = Framer::<ByteStream, _, 4, 1024>::new(
        rx,
        ByteStreamSink::new(Vec::new()),
        run_id,
        FramerConfig::for_format::<ByteStream>(),
    )
    .unwrap();

    for n in 0..4000 {
        assert_eq!(sampler.run_cycle(), CycleOutcome::Written);
        if n % 10 == 9 {
            framer.pass();
        }
    }
    framer.drain();

    let sampled = sampler.stats();
    assert_eq!(sampled.cycles, 4000);
    assert_eq!(sampled.dropped, 0);
    assert_eq!(sampled.degraded_windows, 0);
    assert_eq!(sampled.late_cycles, 0);
    assert_eq!(clock.now().as_u64(), 3999 * 1000 + 750 + 4 * READ_COST_US);

    let framed = framer.stats();
    assert_eq!(framed.cycles, 4000);
    assert_eq!(framed.frames_flushed, 400);
    assert_eq!(framed.sink.frames_sent, 400);
    assert_eq!(framed.sink.bytes_sent, 400 * (26 + 10 * 6));

    let mut decoder = StreamDecoder::<4>::new();
    decoder.push(&framer.into_sink().into_inner());
    let mut next = 0u64;
    while let Some(frame) = decoder.next_frame() {
        let frame = frame.unwrap();
        assert_eq!(frame.run_id, run_id);
        assert_eq!(frame.first_cycle, next);
        for (offset, cycle) in frame.cycles.iter().enumerate() {
            let n = next + offset as u64;
            let want = (0..4).map(|ch| expected(n, ch)).collect::<Vec<_>>();
            assert_eq!(cycle, &want, "cycle {n}");
        }
        next = frame.end_cycle();
    }
    assert_eq!(next, 4000);
    assert_eq!(decoder.skipped_bytes(), 0);
    assert_eq!(decoder.rejected_frames(), 0);
}

#[test]
fn infrequent_drains_fill_frames_to_the_limit() {
    let clock = ManualClock::new();
    let (tx, rx) = spsc::channel::<4, 1024>();
    let mut sampler = simulated_sampler(&clock, tx);
    let mut framer = Framer::<ByteStream, _, 4, 1024>::new(
        rx,
        ByteStreamSink::new(Vec::new()),
        RunId(1),
        FramerConfig::for_format::<ByteStream>(),
    )
    .unwrap();

    for n in 0..1000 {
        sampler.run_cycle();
        if n % 200 == 199 {
            framer.drain();
        }
    }

    let mut decoder = StreamDecoder::<4>::new();
    decoder.push(&framer.into_sink().into_inner());
    let mut sizes = Vec::new();
    while let Some(frame) = decoder.next_frame() {
        sizes.push(frame.unwrap().cycles.len());
    }
    // 200 cycles per drain: two full frames and a 40-cycle tail.
    assert_eq!(sizes, [80, 80, 40].repeat(5));
}

#[test]
fn notifications_without_a_peer_are_dropped_without_stalling() {
    let clock = ManualClock::new();
    let (tx, rx) = spsc::channel::<4, 64>();
    let readiness = Readiness::new();
    let notifier = MemoryNotifier::new();
    let mut sampler = simulated_sampler(&clock, tx);
    let mut framer = Framer::<Notification, _, 4, 64>::new(
        rx,
        NotificationSink::new(notifier.clone(), readiness.clone()),
        RunId(2),
        FramerConfig::for_format::<Notification>(),
    )
    .unwrap();

    for n in 0..2000 {
        assert_eq!(sampler.run_cycle(), CycleOutcome::Written);
        if n % 8 == 7 {
            framer.pass();
        }
    }
    framer.drain();

    let framed = framer.stats();
    assert!(notifier.take().is_empty());
    assert_eq!(framed.cycles, 2000);
    assert_eq!(framed.sink.frames_sent, 0);
    assert_eq!(framed.sink.frames_dropped, framed.frames_flushed);
    assert_eq!(framed.ring_overflows, 0);
    assert_eq!(sampler.stats().dropped, 0);

    // Once a peer subscribes, frames flow and carry the running cycle index.
    readiness.set(true);
    for _ in 0..8 {
        sampler.run_cycle();
    }
    framer.drain();
    let messages = notifier.take();
    assert_eq!(messages.len(), 1);
    let frame = decode_notification::<4>(&messages[0]).unwrap();
    assert_eq!(frame.first_cycle, 2000);
    assert_eq!(frame.cycles.len(), 8);
    assert_eq!(frame.cycles[0][1], converter().convert(code(2000, 1)).get());
}

#[test]
fn stalled_consumer_loses_newest_cycles_only() {
    let clock = ManualClock::new();
    let (tx, rx) = spsc::channel::<4, 64>();
    let mut sampler = simulated_sampler(&clock, tx);
    let mut framer = Framer::<ByteStream, _, 4, 64>::new(
        rx,
        ByteStreamSink::new(Vec::new()),
        RunId(3),
        FramerConfig::for_format::<ByteStream>(),
    )
    .unwrap();

    // The ring holds 16 cycles; the next 24 have nowhere to go.
    let outcomes = (0..40).map(|_| sampler.run_cycle()).collect::<Vec<_>>();
    assert!(outcomes[..16].iter().all(|o| *o == CycleOutcome::Written));
    assert!(outcomes[16..].iter().all(|o| *o == CycleOutcome::Dropped));
    framer.drain();
    assert_eq!(framer.stats().ring_overflows, 24);

    sampler.run_cycle();
    framer.drain();
    assert_eq!(sampler.stats().cycles, 17);
    assert_eq!(sampler.stats().dropped, 24);

    let mut decoder = StreamDecoder::<4>::new();
    decoder.push(&framer.into_sink().into_inner());
    let cycles = std::iter::from_fn(|| decoder.next_frame())
        .flat_map(|frame| frame.unwrap().cycles)
        .collect::<Vec<_>>();
    assert_eq!(cycles.len(), 17);
    for (n, cycle) in cycles[..16].iter().enumerate() {
        assert_eq!(cycle[2], expected(n as u64, 2));
    }
    // Drained index 16 holds grid cycle 40: drops show up in the counters,
    // not as a gap in frame indices.
    assert_eq!(cycles[16][2], expected(40, 2));
}

fn threaded_config(cycles: u64) -> PipelineConfig {
    PipelineConfig {
        max_cycles: Some(cycles),
        cpu: CpuConfig::Disabled,
        ..PipelineConfig::default()
    }
}

#[test]
fn consecutive_starts_get_distinct_run_ids() {
    init_test_tracing();
    let mut ids = Vec::new();
    for _ in 0..2 {
        let clock = MonoClock::start();
        let pipeline = Pipeline::spawn::<ByteStream, _, _, 4, 256>(
            &threaded_config(5),
            SyntheticInput::new(clock, 0),
            clock,
            ByteStreamSink::new(Vec::new()),
        )
        .unwrap();
        let run_id = pipeline.run_id();
        let report = pipeline.wait().unwrap();
        assert_eq!(report.run_id, run_id);

        let mut decoder = StreamDecoder::<4>::new();
        decoder.push(&report.sink.into_inner());
        while let Some(frame) = decoder.next_frame() {
            assert_eq!(frame.unwrap().run_id, run_id);
        }
        ids.push(run_id);
    }
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn threaded_notification_run_is_contiguous() {
    init_test_tracing();
    let clock = MonoClock::start();
    let readiness = Readiness::new();
    readiness.set(true);
    let notifier = MemoryNotifier::new();
    let pipeline = Pipeline::spawn::<Notification, _, _, 4, 1024>(
        &threaded_config(300),
        SyntheticInput::new(clock, 11),
        clock,
        NotificationSink::new(notifier.clone(), readiness),
    )
    .unwrap();
    let report = pipeline.wait().unwrap();

    assert_eq!(report.sampler.cycles + report.sampler.dropped, 300);
    assert_eq!(report.framer.cycles, report.sampler.cycles);

    let mut tracker = GapTracker::new();
    let mut received = 0u64;
    for message in notifier.take() {
        let frame = decode_notification::<4>(&message).unwrap();
        assert_eq!(frame.run_id, report.run_id);
        assert!(matches!(
            tracker.observe(&frame),
            Continuity::Start | Continuity::Contiguous
        ));
        assert!(message.len() <= 240);
        received += frame.cycles.len() as u64;
    }
    assert_eq!(received, report.framer.cycles);
    assert_eq!(tracker.missing_cycles(), 0);
}

#[test]
fn threaded_frames_batch_several_cycles() {
    init_test_tracing();
    let clock = MonoClock::start();
    let pipeline = Pipeline::spawn::<ByteStream, _, _, 4, 1024>(
        &threaded_config(500),
        SyntheticInput::new(clock, 5),
        clock,
        ByteStreamSink::new(Vec::new()),
    )
    .unwrap();
    let report = pipeline.wait().unwrap();
    assert_eq!(report.framer.cycles, report.sampler.cycles);

    let mut decoder = StreamDecoder::<4>::new();
    decoder.push(&report.sink.into_inner());
    let sizes = std::iter::from_fn(|| decoder.next_frame())
        .map(|frame| frame.unwrap().cycles.len())
        .collect::<Vec<_>>();
    let total = sizes.iter().sum::<usize>();
    assert_eq!(total as u64, report.framer.cycles);
    // A 10 ms pass interval over a 1 ms grid batches cycles per frame.
    assert!(total >= 4 * sizes.len(), "frame sizes {sizes:?}");
    let batched = sizes.iter().filter(|&&n| n >= 2).count();
    assert!(batched * 2 > sizes.len(), "frame sizes {sizes:?}");
}

#[test]
fn shutdown_stops_an_unbounded_run() {
    let clock = MonoClock::start();
    let config = PipelineConfig {
        cpu: CpuConfig::Disabled,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::spawn::<ByteStream, _, _, 4, 1024>(
        &config,
        SyntheticInput::new(clock, 3),
        clock,
        ByteStreamSink::new(Vec::new()),
    )
    .unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    let report = pipeline.shutdown().unwrap();

    assert!(report.sampler.cycles > 0);
    assert_eq!(report.framer.cycles, report.sampler.cycles);
    let sent = report.sink.stats().bytes_sent;
    assert_eq!(sent, report.sink.into_inner().len() as u64);
}
