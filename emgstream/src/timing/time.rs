//! Unit-tagged durations and timestamps.
use core::marker::PhantomData;

/// Marker trait for a time unit.
pub trait TimeUnit {
    /// Suffix used when printing values.
    const NAME: &'static str;
    /// Nanoseconds per tick of this unit.
    const NANOS: u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Micros {}
impl TimeUnit for Micros {
    const NAME: &'static str = "us";
    const NANOS: u64 = 1_000;
}

/// Span of time in unit `U`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Duration<U: TimeUnit>(u64, PhantomData<U>);

/// Point on a monotonic timeline in unit `U`, relative to the clock's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp<U: TimeUnit>(u64, PhantomData<U>);

impl<U: TimeUnit> Duration<U> {
    pub const ZERO: Self = Self::new(0);

    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Converts to a standard library duration for `thread::sleep`.
    #[inline]
    #[must_use]
    pub const fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_nanos(self.0 * U::NANOS)
    }
}

impl Duration<Micros> {
    #[inline]
    #[must_use]
    pub const fn from_micros(value: u64) -> Self {
        Self::new(value)
    }
}

impl<U: TimeUnit> Timestamp<U> {
    pub const EPOCH: Self = Self::new(0);

    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Time left until `deadline`, zero if it has passed.
    #[inline]
    #[must_use]
    pub const fn until(self, deadline: Self) -> Duration<U> {
        Duration::new(deadline.0.saturating_sub(self.0))
    }
}

impl<U: TimeUnit> core::ops::Add<Duration<U>> for Timestamp<U> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Duration<U>) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}

/// Elapsed time from `rhs` to `self`, zero if `rhs` is later.
impl<U: TimeUnit> core::ops::Sub for Timestamp<U> {
    type Output = Duration<U>;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Duration::new(self.0.saturating_sub(rhs.0))
    }
}

impl<U: TimeUnit> core::ops::Add for Duration<U> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}

impl<U: TimeUnit> core::ops::Mul<u64> for Duration<U> {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: u64) -> Self::Output {
        Self::new(self.0 * rhs)
    }
}

impl<U: TimeUnit> core::fmt::Display for Duration<U> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}", self.0, U::NAME)
    }
}
