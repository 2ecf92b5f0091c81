//! Raw analog inputs the sampler reads from.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::timing::Clock;

/// A multiplexed ADC: one blocking raw conversion per call.
pub trait AnalogInput: Send {
    /// Converts `channel` once and returns the raw code.
    fn read_raw(&mut self, channel: usize) -> u16;
}

const FULL_SCALE_12: f64 = 4095.0;

/// Deterministic stand-in for electrode inputs.
///
/// Each channel is a sine around mid-scale at its own frequency plus uniform
/// noise, evaluated at the clock's current time. Seeded, so two inputs with
/// the same seed and clock produce the same codes.
#[derive(Debug, Clone)]
pub struct SyntheticInput<K: Clock> {
    clock: K,
    rng: StdRng,
    baseline: f64,
    amplitude: f64,
    noise: u16,
}

impl<K: Clock> SyntheticInput<K> {
    #[must_use]
    pub fn new(clock: K, seed: u64) -> Self {
        Self {
            clock,
            rng: StdRng::seed_from_u64(seed),
            baseline: 2048.0,
            amplitude: 600.0,
            noise: 24,
        }
    }

    /// Peak deviation from mid-scale, in raw codes.
    #[must_use]
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Uniform noise span, in raw codes.
    #[must_use]
    pub fn with_noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }

    fn frequency_hz(channel: usize) -> f64 {
        20.0 + 15.0 * channel as f64
    }
}

impl<K: Clock + Send> AnalogInput for SyntheticInput<K> {
    fn read_raw(&mut self, channel: usize) -> u16 {
        let t = self.clock.now().as_u64() as f64 * 1e-6;
        let wave = self.amplitude * (TAU * Self::frequency_hz(channel) * t).sin();
        let jitter = f64::from(self.rng.gen_range(0..=self.noise)) - f64::from(self.noise) / 2.0;
        (self.baseline + wave + jitter).round().clamp(0.0, FULL_SCALE_12) as u16
    }
}
