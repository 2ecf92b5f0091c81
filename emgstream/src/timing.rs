//! Timing primitives for the sampling grid.
//!
//! - `time`: unit-tagged durations and timestamps.
//! - `clock`: the [`Clock`] trait, a monotonic implementation for real runs
//!   and a manually driven one for simulation.

mod clock;
mod time;

pub use clock::{Clock, ManualClock, MonoClock, DEFAULT_SPIN_MARGIN};
pub use time::{Duration, Micros, Timestamp, TimeUnit};
