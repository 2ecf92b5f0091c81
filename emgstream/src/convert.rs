//! Raw ADC code to millivolt conversion.
//!
//! The converter is a linear characterization of a successive-approximation
//! ADC: `mV = ((coeff_a * raw + round) >> 16) + coeff_b`, where `coeff_a` is
//! derived from a measured reference voltage and the input attenuation, and
//! `coeff_b` is the attenuation's fixed offset. The characterization runs
//! once at startup; after that conversion is a pure function.

use thiserror::Error;

use crate::sample::Sample;

/// Fixed-point scale of `coeff_a`.
const COEFF_A_SHIFT: u32 = 16;
const COEFF_A_ROUND: u64 = 1 << (COEFF_A_SHIFT - 1);

/// Plausible factory reference range. Anything outside indicates a failed
/// reference measurement.
pub const VREF_RANGE_MV: core::ops::RangeInclusive<u16> = 1000..=1200;

/// Nominal reference when no per-device value is known.
pub const DEFAULT_VREF_MV: u16 = 1100;

/// Input attenuation applied ahead of the ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attenuation {
    Db0,
    Db2_5,
    Db6,
    /// Full-scale range of roughly 0–3.3 V, used for the electrode inputs.
    #[default]
    Db11,
}

impl Attenuation {
    /// Gain term of the characterization, in `2^-16` units of the reference.
    const fn scale(self) -> u64 {
        match self {
            Self::Db0 => 57_431,
            Self::Db2_5 => 76_236,
            Self::Db6 => 105_481,
            Self::Db11 => 196_602,
        }
    }

    /// Fixed offset of the characterization in millivolts.
    const fn offset_mv(self) -> u32 {
        match self {
            Self::Db0 => 75,
            Self::Db2_5 => 78,
            Self::Db6 => 88,
            Self::Db11 => 142,
        }
    }
}

/// Conversion resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcWidth(u8);

impl AdcWidth {
    /// 12-bit conversions, the width the sampler runs at.
    pub const BITS_12: Self = Self(12);

    /// Accepts widths from 9 to 12 bits.
    ///
    /// # Errors
    /// [`CalibrationError::UnsupportedWidth`] outside that range.
    pub const fn new(bits: u8) -> Result<Self, CalibrationError> {
        if bits >= 9 && bits <= 12 {
            Ok(Self(bits))
        } else {
            Err(CalibrationError::UnsupportedWidth(bits))
        }
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Largest raw code at this width.
    #[must_use]
    pub const fn max_code(self) -> u16 {
        (1u16 << self.0) - 1
    }
}

impl Default for AdcWidth {
    fn default() -> Self {
        Self::BITS_12
    }
}

/// Startup characterization failures. These abort initialization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalibrationError {
    /// The reference measurement is outside [`VREF_RANGE_MV`].
    #[error("reference voltage {0} mV outside plausible range 1000..=1200 mV")]
    ReferenceOutOfRange(u16),
    /// Bit width the converter cannot characterize.
    #[error("unsupported ADC width of {0} bits")]
    UnsupportedWidth(u8),
}

/// Linear characterization computed once per start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    coeff_a: u32,
    coeff_b: u32,
    width: AdcWidth,
}

impl Calibration {
    /// Characterizes the ADC from a measured reference voltage.
    ///
    /// Readings at narrower widths are scaled up to 12 bits before the linear
    /// map, so the coefficients are always 12-bit coefficients.
    ///
    /// # Errors
    /// [`CalibrationError::ReferenceOutOfRange`] for an implausible reference.
    pub fn characterize(
        vref_mv: u16,
        attenuation: Attenuation,
        width: AdcWidth,
    ) -> Result<Self, CalibrationError> {
        if !VREF_RANGE_MV.contains(&vref_mv) {
            return Err(CalibrationError::ReferenceOutOfRange(vref_mv));
        }
        let full_scale = u64::from(AdcWidth::BITS_12.max_code()) + 1;
        let coeff_a = u64::from(vref_mv) * attenuation.scale() / full_scale;
        Ok(Self {
            // vref <= 1200 and scale < 2^18 keep this well inside u32.
            coeff_a: coeff_a as u32,
            coeff_b: attenuation.offset_mv(),
            width,
        })
    }

    #[must_use]
    pub const fn width(&self) -> AdcWidth {
        self.width
    }
}

/// Pure raw-code → physical-unit map.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConverter {
    calibration: Calibration,
}

impl ChannelConverter {
    #[must_use]
    pub const fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// Converts a raw code to millivolts.
    ///
    /// Codes above the configured width are clamped to full scale. The result
    /// never equals the ring sentinel.
    #[inline]
    #[must_use]
    pub fn convert(&self, raw: u16) -> Sample {
        let cal = &self.calibration;
        let raw = raw.min(cal.width.max_code());
        let raw12 = u64::from(raw) << (12 - cal.width.bits());
        let mv = ((u64::from(cal.coeff_a) * raw12 + COEFF_A_ROUND) >> COEFF_A_SHIFT)
            + u64::from(cal.coeff_b);
        Sample::saturating(u16::try_from(mv).unwrap_or(u16::MAX))
    }

    #[must_use]
    pub const fn calibration(&self) -> &Calibration {
        &self.calibration
    }
}
