//! Core sentinel-slot ring algorithm.
//!
//! [`crate::sync::spsc`] wraps it in typed producer/consumer handles; nothing
//! else touches the slots directly.

pub(crate) mod ring;
