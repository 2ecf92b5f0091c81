//! Thread-level orchestration of the acquisition pipeline.
//!
//! - `pipeline`: spawns the sampler and framer threads and stops them in order.
//! - `topology`: decides which core each thread is pinned to.

pub mod pipeline;
pub mod topology;

pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport};
pub use topology::{CpuConfig, PlacementStrategy, ThreadPlacement};
