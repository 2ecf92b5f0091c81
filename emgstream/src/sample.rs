//! Sample and run identifiers shared by the producer, the ring and the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 16-bit physical-unit reading (millivolts).
///
/// The legal domain is `[0, 0xFFFE]`. `0xFFFF` is reserved as the ring's
/// empty-slot marker and cannot be constructed through the public API,
/// deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[repr(transparent)]
pub struct Sample(u16);

/// The raw value was the reserved empty-slot marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("0xFFFF is reserved for empty ring slots")]
pub struct ReservedSample;

impl Sample {
    /// Largest legal reading.
    pub const MAX: Self = Self(0xFFFE);
    /// Smallest legal reading.
    pub const MIN: Self = Self(0);

    /// Raw slot value meaning "no data yet".
    pub(crate) const EMPTY_RAW: u16 = 0xFFFF;

    /// Creates a sample, saturating anything above [`Sample::MAX`].
    #[inline]
    #[must_use]
    pub const fn saturating(value: u16) -> Self {
        if value > Self::MAX.0 { Self::MAX } else { Self(value) }
    }

    /// Creates a sample, rejecting the reserved sentinel.
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Option<Self> {
        if value == Self::EMPTY_RAW { None } else { Some(Self(value)) }
    }

    /// Returns the reading.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Reinterprets a slot value that the caller has already checked
    /// against the sentinel.
    #[inline]
    pub(crate) const fn from_slot(raw: u16) -> Self {
        debug_assert!(raw != Self::EMPTY_RAW);
        Self(raw)
    }
}

impl From<Sample> for u16 {
    fn from(s: Sample) -> Self {
        s.0
    }
}

impl TryFrom<u16> for Sample {
    type Error = ReservedSample;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(ReservedSample)
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mV", self.0)
    }
}

/// One synchronized round: one sample per channel.
pub type Cycle<const C: usize> = [Sample; C];

/// Random tag generated once per process start and stamped into every frame.
///
/// A receiver that sees the tag change knows the device restarted and that
/// cycle indices begin again at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl RunId {
    /// Draws a fresh identifier from the thread-local RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Wire representation (little-endian).
    #[inline]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_not_a_legal_sample() {
        assert_eq!(Sample::new(0xFFFF), None);
        assert_eq!(Sample::saturating(0xFFFF), Sample::MAX);
        assert_eq!(Sample::new(0xFFFE), Some(Sample::MAX));
    }

    #[test]
    fn deserializing_rejects_the_sentinel() {
        assert_eq!(serde_json::from_str::<Sample>("5").unwrap(), Sample::saturating(5));
        assert_eq!(serde_json::from_str::<Sample>("65534").unwrap(), Sample::MAX);
        let err = serde_json::from_str::<Sample>("65535").unwrap_err();
        assert!(err.to_string().contains("reserved"), "{err}");
        assert_eq!(serde_json::to_string(&Sample::MAX).unwrap(), "65534");
    }

    #[test]
    fn saturating_keeps_in_range_values() {
        for v in [0u16, 1, 1100, 3300, 0x0FFF, 0xFFFE] {
            assert_eq!(Sample::saturating(v).get(), v);
        }
    }

    #[test]
    fn run_ids_differ_between_draws() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn run_id_display_is_fixed_width_hex() {
        assert_eq!(RunId(0xab).to_string(), "00000000000000ab");
    }
}
