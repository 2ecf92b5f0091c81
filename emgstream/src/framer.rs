//! Consumer task: drains whole cycles from the ring into frames.
//!
//! Each pass runs a two-state machine:
//!
//! ```text
//!            cycle ready, fits
//!              +-----+
//!              v     |
//!        ACCUMULATING --(frame full | ring empty)--> FLUSH --> yield
//! ```
//!
//! FLUSH hands the frame to the sink only if at least one cycle was appended
//! since the last flush, then restarts the frame at the next cycle index.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::data::frame::{FrameBuffer, FrameFormat};
use crate::data::transport::{FlushOutcome, SinkStats, TransportSink};
use crate::sample::RunId;
use crate::sync::spsc::{CycleRead, SampleConsumer};
use crate::timing::{Duration, Micros};
use crate::trace::{debug, info, warn};

/// Spins spent on a half-written cycle before the pass gives up and yields.
///
/// The cycle is left in place and picked up on a later pass.
const PENDING_SPIN_LIMIT: u32 = 100_000;

/// Default sleep between passes in [`Framer::run_until`]: about one
/// scheduler tick, so ten cycles accumulate per frame at the default 1 ms
/// cycle.
pub const DEFAULT_PASS_INTERVAL_US: u64 = 10_000;

/// Frame sizing and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramerConfig {
    /// Largest frame handed to the sink, header included.
    pub max_frame_len: usize,
    /// Sleep between passes. Zero only yields.
    pub pass_interval_us: u64,
}

impl FramerConfig {
    /// The variant's default frame limit and the default pass interval.
    #[must_use]
    pub const fn for_format<F: FrameFormat>() -> Self {
        Self {
            max_frame_len: F::DEFAULT_MAX_FRAME,
            pass_interval_us: DEFAULT_PASS_INTERVAL_US,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Accumulating,
    Flush,
}

/// Result of one [`Framer::pass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    /// Cycles drained from the ring this pass.
    pub cycles: usize,
    /// `None` when there was nothing to flush.
    pub flushed: Option<FlushOutcome>,
}

/// Counters kept by the framer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FramerStats {
    pub passes: u64,
    /// Cycles drained; also the index the next frame starts at.
    pub cycles: u64,
    pub frames_flushed: u64,
    /// Ring overflow count last observed.
    pub ring_overflows: u64,
    pub sink: SinkStats,
}

/// Consumer task state.
pub struct Framer<F: FrameFormat, S: TransportSink, const C: usize, const R: usize> {
    ring: SampleConsumer<C, R>,
    sink: S,
    frame: FrameBuffer<F>,
    pass_interval: Duration<Micros>,
    run_id: RunId,
    next_cycle: u64,
    stats: FramerStats,
}

impl<F, S, const C: usize, const R: usize> Framer<F, S, C, R>
where
    F: FrameFormat,
    S: TransportSink,
{
    /// Creates a framer whose first frame starts at cycle 0.
    ///
    /// # Errors
    /// [`ConfigError`] if the frame limit cannot hold one cycle of `C`
    /// channels or exceeds the variant's limit.
    pub fn new(
        ring: SampleConsumer<C, R>,
        sink: S,
        run_id: RunId,
        config: FramerConfig,
    ) -> Result<Self, ConfigError> {
        let mut frame = FrameBuffer::new(config.max_frame_len, C)?;
        frame.begin(run_id, 0);
        Ok(Self {
            ring,
            sink,
            frame,
            pass_interval: Duration::new(config.pass_interval_us),
            run_id,
            next_cycle: 0,
            stats: FramerStats::default(),
        })
    }

    /// Drains ready cycles into the current frame and flushes once.
    pub fn pass(&mut self) -> PassOutcome {
        let mut state = State::Accumulating;
        let mut cycles = 0;
        let mut spins = 0u32;

        while state == State::Accumulating {
            if !self.frame.can_fit_cycle() {
                state = State::Flush;
                continue;
            }
            match self.ring.try_read_next_cycle() {
                CycleRead::Ready(cycle) => {
                    self.frame.push_cycle(&cycle);
                    self.next_cycle += 1;
                    cycles += 1;
                    spins = 0;
                }
                CycleRead::Pending if spins < PENDING_SPIN_LIMIT => {
                    spins += 1;
                    std::hint::spin_loop();
                }
                CycleRead::Pending | CycleRead::Empty => state = State::Flush,
            }
        }

        self.stats.passes += 1;
        self.stats.cycles = self.next_cycle;
        self.note_overflows();
        PassOutcome {
            cycles,
            flushed: self.flush(),
        }
    }

    fn flush(&mut self) -> Option<FlushOutcome> {
        if !self.frame.has_payload() {
            return None;
        }
        let outcome = self.sink.flush(self.frame.finish());
        self.stats.frames_flushed += 1;
        self.frame.begin(self.run_id, self.next_cycle);
        Some(outcome)
    }

    fn note_overflows(&mut self) {
        let total = self.ring.overflow_count();
        if total > self.stats.ring_overflows {
            warn!(
                dropped = total - self.stats.ring_overflows,
                total, "ring overflow, sampler dropped cycles"
            );
            self.stats.ring_overflows = total;
        }
    }

    /// Runs passes until `shutdown` is raised, then drains what is left.
    ///
    /// Between passes the thread sleeps for the pass interval. A pass that
    /// fills a whole frame is followed by another straight away, so a backlog
    /// larger than one frame never waits out an interval.
    pub fn run_until(&mut self, shutdown: &AtomicBool) -> FramerStats {
        info!(
            format = F::NAME,
            run_id = %self.run_id,
            cycles_per_frame = self.frame.cycles_per_frame(),
            "framer started"
        );
        let full = self.frame.cycles_per_frame();
        while !shutdown.load(Ordering::Acquire) {
            while self.pass().cycles == full {}
            if self.pass_interval == Duration::ZERO {
                std::thread::yield_now();
            } else {
                std::thread::sleep(self.pass_interval.to_std());
            }
        }
        self.drain();
        let stats = self.stats();
        info!(
            cycles = stats.cycles,
            sent = stats.sink.frames_sent,
            dropped = stats.sink.frames_dropped,
            ring_overflows = stats.ring_overflows,
            "framer stopped"
        );
        stats
    }

    /// Passes until the ring is empty and nothing is left to flush.
    pub fn drain(&mut self) {
        loop {
            let outcome = self.pass();
            if outcome.cycles == 0 && outcome.flushed.is_none() {
                break;
            }
            debug!(cycles = outcome.cycles, "drained after shutdown");
        }
    }

    #[must_use]
    pub fn stats(&self) -> FramerStats {
        FramerStats {
            sink: self.sink.stats(),
            ..self.stats
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Index the next drained cycle will get.
    #[must_use]
    pub const fn next_cycle(&self) -> u64 {
        self.next_cycle
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
