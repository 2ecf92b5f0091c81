//! Geometry errors shared by the sampler, framer and frame buffer configs.

use thiserror::Error;

/// A configuration that cannot run. Rejected at construction, never at runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one channel is required")]
    NoChannels,
    #[error("cycle period must be non-zero")]
    ZeroPeriod,
    #[error("cycle period {period_us} us exceeds the {max_us} us limit")]
    PeriodTooLong { period_us: u64, max_us: u64 },
    #[error("read window must be non-zero")]
    ZeroWindow,
    #[error("reads per window must be at least 1")]
    ZeroReads,
    /// The last channel's window ends after the cycle does.
    #[error("channel schedule needs {needed_us} us but the cycle is {period_us} us")]
    ScheduleOverrun { needed_us: u64, period_us: u64 },
    /// Not even one cycle fits after the header.
    #[error("frame limit {max_len} B cannot hold a header and one cycle ({needed} B)")]
    FrameTooSmall { max_len: usize, needed: usize },
    /// The byte-stream length field is 16 bits wide.
    #[error("frame limit {max_len} B exceeds the {limit} B length field")]
    FrameTooLarge { max_len: usize, limit: usize },
}
