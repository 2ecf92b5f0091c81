//! Real-time multi-channel biosignal acquisition.
//!
//! A sampler thread reads every analog channel once per cycle on a fixed time
//! grid, converts the readings to millivolts and hands them to a framer thread
//! through a lock-free ring. The framer batches whole cycles into
//! self-describing frames for a byte-stream or notification transport, and
//! [`data::decode`] turns those frames back into cycles on the receiving side.
//!
//! ```text
//! AnalogInput -> Sampler -> sync::spsc ring -> Framer -> TransportSink
//! ```

pub mod config;
pub mod convert;
pub mod data;
pub mod framer;
pub mod input;
pub mod runtime;
pub mod sample;
pub mod sampler;
mod spsc;
pub mod sync;
pub mod timing;
mod trace;

pub use config::ConfigError;
pub use convert::{AdcWidth, Attenuation, Calibration, CalibrationError, ChannelConverter};
pub use framer::{Framer, FramerConfig, FramerStats, PassOutcome};
pub use input::{AnalogInput, SyntheticInput};
pub use runtime::{Pipeline, PipelineConfig, PipelineError, PipelineReport};
pub use sample::{Cycle, ReservedSample, RunId, Sample};
pub use sampler::{CycleOutcome, Sampler, SamplerConfig, SamplerStats};
pub use trace::init_tracing;
