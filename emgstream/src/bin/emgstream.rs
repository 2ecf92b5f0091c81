//! Command-line front end.
//!
//! # Usage
//!
//! ```sh
//! # 5 s of synthetic data as a byte stream, decoded again as JSON lines
//! emgstream stream --cycles 5000 | emgstream decode
//!
//! # notification frames, one hex line each, peer subscribing after 200 ms
//! emgstream stream --transport notification --ready-after-ms 200 --cycles 1000
//! ```
//!
//! Logs go to stderr (`RUST_LOG=emgstream=debug` for more); stdout carries
//! only frames or decoded output.

use std::io::{self, BufRead, Read, Write};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;

use emgstream::data::{
    ByteStream, ByteStreamSink, Continuity, DecodeError, DecodedFrame, GapTracker, Notification,
    NotificationSink, Notifier, NotifyError, Readiness, StreamDecoder, TransportSink,
    decode_notification,
};
use emgstream::framer::DEFAULT_PASS_INTERVAL_US;
use emgstream::runtime::CpuConfig;
use emgstream::timing::MonoClock;
use emgstream::{
    AdcWidth, Pipeline, PipelineConfig, PipelineError, PipelineReport, SamplerConfig,
    SyntheticInput,
};

/// Channels sampled per cycle.
const CHANNELS: usize = 4;
/// Ring capacity in samples: 256 cycles, a quarter second at the default rate.
const RING_SLOTS: usize = 1024;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the acquisition pipeline on the synthetic input, frames to stdout
    Stream(StreamArgs),
    /// Decode frames from stdin into JSON lines
    Decode(DecodeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    ByteStream,
    Notification,
}

#[derive(clap::Args, Debug)]
struct StreamArgs {
    #[arg(long, value_enum, default_value_t = Transport::ByteStream)]
    transport: Transport,

    /// Stop after this many cycles (default: run until killed)
    #[arg(long)]
    cycles: Option<u64>,

    /// Cycle period in microseconds
    #[arg(long, value_name = "US", default_value_t = 1000)]
    cycle_us: u64,

    /// Offset between channel windows in microseconds
    #[arg(long, value_name = "US", default_value_t = 250)]
    stride_us: u64,

    /// Read window per channel in microseconds
    #[arg(long, value_name = "US", default_value_t = 200)]
    window_us: u64,

    /// Reads averaged per channel window
    #[arg(long, value_name = "K", default_value_t = 4)]
    reads: u32,

    /// ADC reference voltage in millivolts
    #[arg(long, value_name = "MV", default_value_t = 1100)]
    vref: u16,

    /// ADC resolution in bits
    #[arg(long, default_value_t = 12)]
    bits: u8,

    /// Frame size limit in bytes, header included
    #[arg(long, value_name = "BYTES")]
    max_frame: Option<usize>,

    /// Framer sleep between passes in microseconds
    #[arg(long, value_name = "US", default_value_t = DEFAULT_PASS_INTERVAL_US)]
    pass_us: u64,

    /// Seed for the synthetic input
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Notification transport: delay before the simulated peer subscribes
    /// (default: subscribed from the start)
    #[arg(long, value_name = "MS")]
    ready_after_ms: Option<u64>,

    /// Do not pin the sampler and framer threads to cores
    #[arg(long)]
    no_pin: bool,
}

#[derive(clap::Args, Debug)]
struct DecodeArgs {
    /// Framing of the input
    #[arg(long, value_enum, default_value_t = Transport::ByteStream)]
    transport: Transport,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("invalid ADC width: {0}")]
    Width(#[from] emgstream::CalibrationError),
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    emgstream::init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Stream(args) => stream(&args),
        Commands::Decode(args) => decode(&args),
    };
    if let Err(e) = result {
        eprintln!("emgstream: {e}");
        std::process::exit(1);
    }
}

/// Notifier that writes each message to stdout as one hex line.
struct HexLineNotifier<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> Notifier for HexLineNotifier<W> {
    fn notify(&mut self, message: &[u8]) -> Result<(), NotifyError> {
        writeln!(self.out, "{}", hex::encode(message))
            .and_then(|()| self.out.flush())
            .map_err(|e| match e.kind() {
                io::ErrorKind::BrokenPipe => NotifyError::Disconnected,
                _ => NotifyError::Rejected(e.to_string()),
            })
    }
}

fn stream(args: &StreamArgs) -> Result<(), CliError> {
    let config = PipelineConfig {
        sampler: SamplerConfig {
            period_us: args.cycle_us,
            stride_us: args.stride_us,
            window_us: args.window_us,
            max_reads: args.reads,
        },
        max_frame_len: args.max_frame,
        pass_interval_us: args.pass_us,
        vref_mv: args.vref,
        width: AdcWidth::new(args.bits)?,
        cpu: if args.no_pin {
            CpuConfig::Disabled
        } else {
            CpuConfig::Auto
        },
        max_cycles: args.cycles,
        ..PipelineConfig::default()
    };
    let clock = MonoClock::start();
    let input = SyntheticInput::new(clock, args.seed);

    match args.transport {
        Transport::ByteStream => {
            let sink = ByteStreamSink::new(io::stdout());
            let pipeline = Pipeline::spawn::<ByteStream, _, _, CHANNELS, RING_SLOTS>(
                &config, input, clock, sink,
            )?;
            summarize(&pipeline.wait()?);
        }
        Transport::Notification => {
            let readiness = Readiness::new();
            match args.ready_after_ms {
                None => readiness.set(true),
                Some(ms) => {
                    let peer = readiness.clone();
                    thread::Builder::new().name("emg-peer".into()).spawn(move || {
                        thread::sleep(Duration::from_millis(ms));
                        peer.set(true);
                    })?;
                }
            }
            let sink = NotificationSink::new(HexLineNotifier { out: io::stdout() }, readiness);
            let pipeline = Pipeline::spawn::<Notification, _, _, CHANNELS, RING_SLOTS>(
                &config, input, clock, sink,
            )?;
            summarize(&pipeline.wait()?);
        }
    }
    Ok(())
}

fn summarize<S: TransportSink>(report: &PipelineReport<S>) {
    eprintln!("emgstream: {}", summary_line(report));
}

fn summary_line<S: TransportSink>(report: &PipelineReport<S>) -> String {
    let sink = report.sink.stats();
    format!(
        "run {} sampled {} cycles, {} dropped on a full ring ({} seen by the framer), \
         {} degraded windows, sent {} frames / {} bytes, {} frames dropped",
        report.run_id,
        report.sampler.cycles,
        report.sampler.dropped,
        report.framer.ring_overflows,
        report.sampler.degraded_windows,
        sink.frames_sent,
        sink.bytes_sent,
        sink.frames_dropped,
    )
}

/// Bytes of one line written by [`HexLineNotifier`].
fn notification_line(line: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(line.trim())
}

fn decode(args: &DecodeArgs) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tracker = GapTracker::new();
    let mut frames = 0u64;

    let mut emit = |frame: Result<DecodedFrame, DecodeError>| -> Result<(), CliError> {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("emgstream: skipped malformed frame: {e}");
                return Ok(());
            }
        };
        match tracker.observe(&frame) {
            Continuity::Gap { missing } => {
                eprintln!("emgstream: {missing} cycles missing before cycle {}", frame.first_cycle);
            }
            Continuity::Overlap { repeated } => {
                eprintln!("emgstream: {repeated} cycles repeated at cycle {}", frame.first_cycle);
            }
            Continuity::Reset { previous } => {
                eprintln!("emgstream: device restarted (run {previous} -> {})", frame.run_id);
            }
            Continuity::Start | Continuity::Contiguous => {}
        }
        serde_json::to_writer(&mut out, &frame)?;
        writeln!(out)?;
        frames += 1;
        Ok(())
    };

    match args.transport {
        Transport::ByteStream => {
            let mut decoder = StreamDecoder::<CHANNELS>::new();
            let mut stdin = io::stdin().lock();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stdin.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                decoder.push(&chunk[..n]);
                while let Some(frame) = decoder.next_frame() {
                    emit(frame)?;
                }
            }
            if decoder.skipped_bytes() > 0 {
                eprintln!("emgstream: skipped {} bytes of noise", decoder.skipped_bytes());
            }
        }
        Transport::Notification => {
            for line in io::stdin().lock().lines() {
                let line = line?;
                match notification_line(&line) {
                    Ok(bytes) => emit(decode_notification::<CHANNELS>(&bytes))?,
                    Err(e) => eprintln!("emgstream: ignoring line that is not hex: {e}"),
                }
            }
        }
    }

    eprintln!(
        "emgstream: decoded {frames} frames, {} cycles missing, {} restarts",
        tracker.missing_cycles(),
        tracker.resets()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emgstream::data::SinkStats;
    use emgstream::{FramerStats, RunId, SamplerStats};

    #[test]
    fn notifier_writes_one_hex_line_per_message() {
        let mut notifier = HexLineNotifier { out: Vec::new() };
        notifier.notify(&[0x0a, 0xff]).unwrap();
        notifier.notify(&[]).unwrap();
        assert_eq!(String::from_utf8(notifier.out).unwrap(), "0aff\n\n");
    }

    #[test]
    fn notification_lines_report_bad_hex() {
        assert_eq!(notification_line(" 0AfF\r").unwrap(), [0x0a, 0xff]);
        assert_eq!(notification_line("abc"), Err(hex::FromHexError::OddLength));
        assert!(matches!(
            notification_line("zz"),
            Err(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        ));
    }

    #[test]
    fn summary_reports_cycles_lost_to_overflow() {
        let report = PipelineReport {
            run_id: RunId(0x2a),
            sampler: SamplerStats {
                cycles: 17,
                dropped: 24,
                ..SamplerStats::default()
            },
            framer: FramerStats {
                cycles: 17,
                ring_overflows: 24,
                sink: SinkStats::default(),
                ..FramerStats::default()
            },
            sink: ByteStreamSink::new(Vec::new()),
        };
        let line = summary_line(&report);
        assert!(line.starts_with("run 000000000000002a sampled 17 cycles"), "{line}");
        assert!(line.contains("24 dropped on a full ring (24 seen by the framer)"), "{line}");
    }
}
