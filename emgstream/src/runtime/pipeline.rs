//! Spawns and stops the sampler/framer thread pair.
//!
//! ```text
//! input -> [emg-sampler] -> sample ring -> [emg-framer] -> sink
//! ```
//!
//! Shutdown is ordered so no sampled cycle is lost: the sampler is stopped
//! and joined first, then the framer drains the ring, flushes, and exits.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::config::ConfigError;
use crate::convert::{
    AdcWidth, Attenuation, Calibration, CalibrationError, ChannelConverter, DEFAULT_VREF_MV,
};
use crate::data::frame::FrameFormat;
use crate::data::transport::TransportSink;
use crate::framer::{DEFAULT_PASS_INTERVAL_US, Framer, FramerConfig, FramerStats};
use crate::input::AnalogInput;
use crate::runtime::topology::{CpuConfig, pin_to_core};
use crate::sample::RunId;
use crate::sampler::{Sampler, SamplerConfig, SamplerStats};
use crate::sync::spsc;
use crate::timing::Clock;
use crate::trace::{debug, error, info, warn};

/// Everything needed to start a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sampler: SamplerConfig,
    /// Frame limit; `None` uses the frame variant's default.
    pub max_frame_len: Option<usize>,
    /// Framer sleep between passes.
    pub pass_interval_us: u64,
    /// Measured ADC reference voltage.
    pub vref_mv: u16,
    pub attenuation: Attenuation,
    pub width: AdcWidth,
    pub cpu: CpuConfig,
    /// Stop sampling on its own after this many cycles.
    pub max_cycles: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            max_frame_len: None,
            pass_interval_us: DEFAULT_PASS_INTERVAL_US,
            vref_mv: DEFAULT_VREF_MV,
            attenuation: Attenuation::default(),
            width: AdcWidth::default(),
            cpu: CpuConfig::default(),
            max_cycles: None,
        }
    }
}

/// Startup and teardown failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ADC calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// Final counters, plus the sink handed back from the framer thread.
#[derive(Debug)]
pub struct PipelineReport<S> {
    pub run_id: RunId,
    pub sampler: SamplerStats,
    pub framer: FramerStats,
    pub sink: S,
}

/// Handle to a running pipeline.
///
/// Dropping the handle signals both threads to stop but does not wait.
/// Use [`Pipeline::shutdown`] or [`Pipeline::wait`] to join them.
pub struct Pipeline<S: TransportSink> {
    run_id: RunId,
    sampler_stop: Arc<AtomicBool>,
    framer_stop: Arc<AtomicBool>,
    sampler_handle: Option<JoinHandle<SamplerStats>>,
    framer_handle: Option<JoinHandle<(FramerStats, S)>>,
}

fn spawn_named<T, Body>(name: &'static str, body: Body) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    Body: FnOnce() -> T + Send + 'static,
{
    debug!(thread = name, "spawning");
    thread::Builder::new()
        .name(format!("emg-{name}"))
        .spawn(body)
        .map_err(|source| {
            error!(thread = name, error = %source, "spawn failed");
            PipelineError::Spawn {
                thread: name,
                source,
            }
        })
}

fn pin(thread: &'static str, core: Option<usize>) {
    if let Some(core) = core {
        if pin_to_core(core) {
            debug!(thread, core, "pinned");
        } else {
            warn!(thread, core, "could not pin thread, running unpinned");
        }
    }
}

impl<S: TransportSink + 'static> Pipeline<S> {
    /// Characterizes the ADC, builds the ring, and starts both threads.
    ///
    /// A fresh [`RunId`] is drawn for every call.
    ///
    /// # Errors
    /// - [`PipelineError::Calibration`] if the reference voltage is implausible
    /// - [`PipelineError::Config`] for an unrunnable schedule or frame size
    /// - [`PipelineError::Spawn`] if the OS refuses a thread
    pub fn spawn<F, A, K, const C: usize, const R: usize>(
        config: &PipelineConfig,
        input: A,
        clock: K,
        sink: S,
    ) -> Result<Self, PipelineError>
    where
        F: FrameFormat,
        A: AnalogInput + 'static,
        K: Clock + Send + 'static,
    {
        let calibration = Calibration::characterize(config.vref_mv, config.attenuation, config.width)
            .inspect_err(|e| error!(error = %e, "calibration rejected"))?;
        let run_id = RunId::generate();
        let framer_config = FramerConfig {
            max_frame_len: config.max_frame_len.unwrap_or(F::DEFAULT_MAX_FRAME),
            pass_interval_us: config.pass_interval_us,
        };
        let placement = config.cpu.resolve();
        info!(
            %run_id,
            channels = C,
            ring_slots = R,
            format = F::NAME,
            max_frame_len = framer_config.max_frame_len,
            pass_interval_us = framer_config.pass_interval_us,
            placement = %placement.strategy,
            "pipeline starting"
        );

        let (producer, consumer) = spsc::channel::<C, R>();
        let mut framer = Framer::<F, S, C, R>::new(consumer, sink, run_id, framer_config)?;
        let mut sampler = Sampler::new(
            input,
            clock,
            ChannelConverter::new(calibration),
            producer,
            config.sampler,
        )?;

        let sampler_stop = Arc::new(AtomicBool::new(false));
        let framer_stop = Arc::new(AtomicBool::new(false));

        let stop = Arc::clone(&framer_stop);
        let framer_core = placement.framer_core;
        let framer_handle = spawn_named("framer", move || {
            pin("framer", framer_core);
            let stats = framer.run_until(&stop);
            (stats, framer.into_sink())
        })?;

        let stop = Arc::clone(&sampler_stop);
        let sampler_core = placement.sampler_core;
        let max_cycles = config.max_cycles;
        let sampler_handle = spawn_named("sampler", move || {
            pin("sampler", sampler_core);
            match max_cycles {
                Some(n) => sampler.run_for(n, &stop),
                None => sampler.run_until(&stop),
            }
        });
        let sampler_handle = match sampler_handle {
            Ok(handle) => handle,
            Err(e) => {
                framer_stop.store(true, Ordering::Release);
                let _ = framer_handle.join();
                return Err(e);
            }
        };

        Ok(Self {
            run_id,
            sampler_stop,
            framer_stop,
            sampler_handle: Some(sampler_handle),
            framer_handle: Some(framer_handle),
        })
    }

    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Flag that stops the sampler when raised, e.g. from a signal handler.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.sampler_stop)
    }

    /// Stops sampling now, then drains and joins.
    ///
    /// # Errors
    /// [`PipelineError::Panicked`] if either thread panicked.
    pub fn shutdown(self) -> Result<PipelineReport<S>, PipelineError> {
        info!("pipeline shutdown requested");
        self.sampler_stop.store(true, Ordering::Release);
        self.wait()
    }

    /// Waits for the sampler to stop on its own (cycle limit or shutdown
    /// flag), then drains and joins the framer.
    ///
    /// # Errors
    /// [`PipelineError::Panicked`] if either thread panicked.
    pub fn wait(mut self) -> Result<PipelineReport<S>, PipelineError> {
        let sampler = self.sampler_handle.take().map(JoinHandle::join);
        self.framer_stop.store(true, Ordering::Release);
        let framer = self.framer_handle.take().map(JoinHandle::join);

        let sampler = match sampler {
            Some(Ok(stats)) => stats,
            _ => return Err(PipelineError::Panicked("sampler")),
        };
        let (framer, sink) = match framer {
            Some(Ok(out)) => out,
            _ => return Err(PipelineError::Panicked("framer")),
        };
        info!(
            run_id = %self.run_id,
            sampled = sampler.cycles,
            framed = framer.cycles,
            overflowed = sampler.dropped,
            "pipeline stopped"
        );
        Ok(PipelineReport {
            run_id: self.run_id,
            sampler,
            framer,
            sink,
        })
    }
}

impl<S: TransportSink> Drop for Pipeline<S> {
    fn drop(&mut self) {
        self.sampler_stop.store(true, Ordering::Release);
        self.framer_stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ByteStream, ByteStreamSink, StreamDecoder};
    use crate::input::SyntheticInput;
    use crate::timing::MonoClock;

    #[test]
    fn implausible_reference_is_fatal() {
        let config = PipelineConfig {
            vref_mv: 1500,
            ..PipelineConfig::default()
        };
        let clock = MonoClock::start();
        let result = Pipeline::spawn::<ByteStream, _, _, 4, 64>(
            &config,
            SyntheticInput::new(clock, 0),
            clock,
            ByteStreamSink::new(Vec::new()),
        );
        assert!(matches!(
            result,
            Err(PipelineError::Calibration(CalibrationError::ReferenceOutOfRange(1500)))
        ));
    }

    #[test]
    fn bad_frame_size_is_a_config_error() {
        let config = PipelineConfig {
            max_frame_len: Some(10),
            ..PipelineConfig::default()
        };
        let clock = MonoClock::start();
        let result = Pipeline::spawn::<ByteStream, _, _, 4, 64>(
            &config,
            SyntheticInput::new(clock, 0),
            clock,
            ByteStreamSink::new(Vec::new()),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn bounded_run_delivers_every_cycle() {
        let config = PipelineConfig {
            max_cycles: Some(50),
            cpu: CpuConfig::Disabled,
            ..PipelineConfig::default()
        };
        let clock = MonoClock::start();
        let pipeline = Pipeline::spawn::<ByteStream, _, _, 4, 1024>(
            &config,
            SyntheticInput::new(clock, 7),
            clock,
            ByteStreamSink::new(Vec::new()),
        )
        .unwrap();
        let run_id = pipeline.run_id();
        let report = pipeline.wait().unwrap();

        assert_eq!(report.sampler.cycles + report.sampler.dropped, 50);
        assert_eq!(report.framer.cycles, report.sampler.cycles);

        let mut decoder = StreamDecoder::<4>::new();
        decoder.push(&report.sink.into_inner());
        let mut next = 0;
        while let Some(frame) = decoder.next_frame() {
            let frame = frame.unwrap();
            assert_eq!(frame.run_id, run_id);
            assert_eq!(frame.first_cycle, next);
            next = frame.end_cycle();
        }
        assert_eq!(next, report.framer.cycles);
    }
}
