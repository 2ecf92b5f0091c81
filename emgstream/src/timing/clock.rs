//! Clocks the sampler schedules against.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::time::{Duration, Micros, Timestamp};

/// Portion of a deadline wait spent spinning rather than sleeping.
///
/// OS sleeps overshoot by tens of microseconds, so the final stretch before a
/// channel window opens is polled.
pub const DEFAULT_SPIN_MARGIN: Duration<Micros> = Duration::from_micros(150);

/// Monotonic time source with a "wait until absolute deadline" primitive.
pub trait Clock {
    /// Current time relative to this clock's epoch.
    fn now(&self) -> Timestamp<Micros>;

    /// Returns once `now() >= deadline`. Returns immediately for past deadlines.
    fn wait_until(&self, deadline: Timestamp<Micros>);
}

/// Wall-clock implementation backed by [`minstant::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonoClock {
    epoch: minstant::Instant,
    spin_margin: Duration<Micros>,
}

impl MonoClock {
    /// Starts a clock whose epoch is now.
    #[must_use]
    pub fn start() -> Self {
        Self::with_spin_margin(DEFAULT_SPIN_MARGIN)
    }

    /// Starts a clock that spins for the last `spin_margin` of every wait.
    #[must_use]
    pub fn with_spin_margin(spin_margin: Duration<Micros>) -> Self {
        Self {
            epoch: minstant::Instant::now(),
            spin_margin,
        }
    }
}

impl Clock for MonoClock {
    #[inline]
    fn now(&self) -> Timestamp<Micros> {
        let elapsed = self.epoch.elapsed().as_micros();
        Timestamp::new(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    fn wait_until(&self, deadline: Timestamp<Micros>) {
        loop {
            let remaining = self.now().until(deadline);
            if remaining == Duration::ZERO {
                return;
            }
            if remaining > self.spin_margin {
                let coarse = Duration::<Micros>::new(remaining.as_u64() - self.spin_margin.as_u64());
                std::thread::sleep(coarse.to_std());
            } else {
                std::hint::spin_loop();
            }
        }
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same timeline, so a simulated ADC can advance the time
/// the sampler observes. `wait_until` jumps straight to the deadline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `by`.
    pub fn advance(&self, by: Duration<Micros>) {
        self.now.fetch_add(by.as_u64(), Ordering::AcqRel);
    }

    /// Moves time to `to` unless it is already later.
    pub fn advance_to(&self, to: Timestamp<Micros>) {
        self.now.fetch_max(to.as_u64(), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> Timestamp<Micros> {
        Timestamp::new(self.now.load(Ordering::Acquire))
    }

    fn wait_until(&self, deadline: Timestamp<Micros>) {
        self.advance_to(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(Duration::from_micros(40));
        assert_eq!(view.now().as_u64(), 40);
    }

    #[test]
    fn manual_wait_never_moves_backwards() {
        let clock = ManualClock::new();
        clock.wait_until(Timestamp::new(1000));
        clock.wait_until(Timestamp::new(250));
        assert_eq!(clock.now().as_u64(), 1000);
    }

    #[test]
    fn mono_clock_reaches_deadline() {
        let clock = MonoClock::start();
        let deadline = clock.now() + Duration::from_micros(2_000);
        clock.wait_until(deadline);
        assert!(clock.now() >= deadline);
    }

    #[test]
    fn mono_clock_past_deadline_returns_immediately() {
        let clock = MonoClock::start();
        clock.wait_until(Timestamp::EPOCH);
        assert!(clock.now() < Timestamp::new(1_000_000));
    }
}
