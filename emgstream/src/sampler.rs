//! Real-time producer: samples every channel once per cycle on a fixed grid.
//!
//! Cycle `n` starts at `epoch + n * period`, independent of how long earlier
//! cycles took, so a late cycle never shifts the ones after it. Inside a
//! cycle, channel `i` gets its own read window:
//!
//! ```text
//! cycle start                                             next cycle
//! |-- ch0 [window] --|-- ch1 [window] --|-- ch2 ... --|   |
//! 0                  stride             2*stride          period
//! ```
//!
//! Within a window the channel is read up to `max_reads` times, stopping early
//! when the window closes but always reading at least once. The integer mean
//! of the raw codes is converted and written to the ring.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::convert::ChannelConverter;
use crate::input::AnalogInput;
use crate::sync::spsc::SampleProducer;
use crate::timing::{Clock, Duration, Micros, Timestamp};
use crate::trace::{info, trace, warn};

/// Longest accepted cycle period: one second.
pub const MAX_PERIOD_US: u64 = 1_000_000;

/// Cycle timing. All values in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Cycle budget `T`.
    pub period_us: u64,
    /// Offset between consecutive channel windows.
    pub stride_us: u64,
    /// Length of each channel's read window `W`.
    pub window_us: u64,
    /// Read count `K` that ends a window early.
    pub max_reads: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period_us: 1000,
            stride_us: 250,
            window_us: 200,
            max_reads: 4,
        }
    }
}

impl SamplerConfig {
    /// Checks the schedule is runnable for `channels` channels.
    ///
    /// # Errors
    /// [`ConfigError`] for zero timings, zero reads, a period above
    /// [`MAX_PERIOD_US`], or windows that spill past the end of the cycle.
    pub fn validate(&self, channels: usize) -> Result<(), ConfigError> {
        if channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        if self.period_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.period_us > MAX_PERIOD_US {
            return Err(ConfigError::PeriodTooLong {
                period_us: self.period_us,
                max_us: MAX_PERIOD_US,
            });
        }
        if self.window_us == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_reads == 0 {
            return Err(ConfigError::ZeroReads);
        }
        let needed_us = (channels as u64 - 1)
            .saturating_mul(self.stride_us)
            .saturating_add(self.window_us);
        if needed_us > self.period_us {
            return Err(ConfigError::ScheduleOverrun {
                needed_us,
                period_us: self.period_us,
            });
        }
        Ok(())
    }

    fn period(&self) -> Duration<Micros> {
        Duration::new(self.period_us)
    }

    fn stride(&self) -> Duration<Micros> {
        Duration::new(self.stride_us)
    }

    fn window(&self) -> Duration<Micros> {
        Duration::new(self.window_us)
    }
}

/// Counters kept by the sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    /// Cycles written to the ring.
    pub cycles: u64,
    /// Cycles dropped because the ring was full.
    pub dropped: u64,
    /// Windows that closed before `max_reads` reads.
    pub degraded_windows: u64,
    /// Cycles that began after their own period had already elapsed.
    pub late_cycles: u64,
}

/// Result of one [`Sampler::run_cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Written,
    /// Ring full; nothing was read or written.
    Dropped,
}

/// Producer task state.
pub struct Sampler<A, K, const C: usize, const R: usize> {
    input: A,
    clock: K,
    converter: ChannelConverter,
    ring: SampleProducer<C, R>,
    config: SamplerConfig,
    epoch: Timestamp<Micros>,
    cycle_index: u64,
    stats: SamplerStats,
}

impl<A, K, const C: usize, const R: usize> Sampler<A, K, C, R>
where
    A: AnalogInput,
    K: Clock,
{
    /// Creates a sampler whose grid starts at the clock's current time.
    ///
    /// # Errors
    /// [`ConfigError`] if `config` is not runnable for `C` channels.
    pub fn new(
        input: A,
        clock: K,
        converter: ChannelConverter,
        ring: SampleProducer<C, R>,
        config: SamplerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate(C)?;
        let epoch = clock.now();
        Ok(Self {
            input,
            clock,
            converter,
            ring,
            config,
            epoch,
            cycle_index: 0,
            stats: SamplerStats::default(),
        })
    }

    /// Start time of cycle `n` on the absolute grid.
    fn cycle_start(&self, n: u64) -> Timestamp<Micros> {
        self.epoch + self.config.period() * n
    }

    /// Runs the next cycle of the grid.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let start = self.cycle_start(self.cycle_index);
        self.cycle_index += 1;
        // Dropped cycles still occupy their grid slot.
        self.clock.wait_until(start);

        if !self.ring.reserve_cycle() {
            self.stats.dropped += 1;
            trace!(cycle = self.cycle_index - 1, "ring full, cycle dropped");
            return CycleOutcome::Dropped;
        }
        if self.clock.now() >= start + self.config.period() {
            self.stats.late_cycles += 1;
        }

        for channel in 0..C {
            let open = start + self.config.stride() * channel as u64;
            let close = open + self.config.window();
            self.clock.wait_until(open);

            let mut total = 0u64;
            let mut count = 0u32;
            loop {
                total += u64::from(self.input.read_raw(channel));
                count += 1;
                if count >= self.config.max_reads || self.clock.now() >= close {
                    break;
                }
            }
            if count < self.config.max_reads {
                self.stats.degraded_windows += 1;
            }

            // Mean of u16 codes always fits u16.
            let mean = u16::try_from(total / u64::from(count)).unwrap_or(u16::MAX);
            self.ring.write(self.converter.convert(mean));
        }

        self.stats.cycles += 1;
        CycleOutcome::Written
    }

    /// Samples until `shutdown` is raised, yielding once per cycle.
    pub fn run_until(&mut self, shutdown: &AtomicBool) -> SamplerStats {
        self.run(shutdown, None)
    }

    /// Like [`run_until`](Self::run_until), but also stops after `cycles`
    /// grid cycles, written or dropped.
    pub fn run_for(&mut self, cycles: u64, shutdown: &AtomicBool) -> SamplerStats {
        self.run(shutdown, Some(self.cycle_index + cycles))
    }

    fn run(&mut self, shutdown: &AtomicBool, end: Option<u64>) -> SamplerStats {
        info!(
            channels = C,
            period_us = self.config.period_us,
            max_reads = self.config.max_reads,
            "sampler started"
        );
        while !shutdown.load(Ordering::Acquire) && end.is_none_or(|end| self.cycle_index < end) {
            self.run_cycle();
            std::thread::yield_now();
        }
        let stats = self.stats;
        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "sampler dropped cycles to ring overflow");
        }
        info!(
            cycles = stats.cycles,
            degraded = stats.degraded_windows,
            late = stats.late_cycles,
            "sampler stopped"
        );
        stats
    }

    #[must_use]
    pub const fn stats(&self) -> SamplerStats {
        self.stats
    }

    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }
}
