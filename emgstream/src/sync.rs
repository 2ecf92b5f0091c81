//! Primitives for handing data between the sampler and framer threads.

pub mod spsc;
