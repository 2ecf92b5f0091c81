//! Lock-free sample ring between the sampler (producer) and framer (consumer).
//!
//! # Overview
//!
//! - [`SampleProducer`] - write end, owned by the sampler thread
//! - [`SampleConsumer`] - read end, owned by the framer thread
//! - No mutexes, no shared indices: empty slots hold a sentinel and each side
//!   owns its own cursor
//!
//! The consumer only ever hands out whole cycles of `C` samples. `R` must be a
//! non-zero multiple of `C`; this is checked at compile time.
//!
//! # Overflow
//!
//! Before writing a cycle the producer calls [`SampleProducer::reserve_cycle`],
//! which checks that all `C` slots are free. If the consumer has fallen a full
//! ring behind, the new cycle is dropped and counted instead of overwriting
//! samples that have not been read yet.
//!
//! # Example
//!
//! ```
//! use emgstream::sample::Sample;
//! use emgstream::sync::spsc::{self, CycleRead};
//!
//! let (mut tx, mut rx) = spsc::channel::<2, 8>();
//!
//! assert!(tx.reserve_cycle());
//! tx.write(Sample::saturating(10));
//! assert_eq!(rx.try_read_next_cycle(), CycleRead::Pending);
//! tx.write(Sample::saturating(20));
//!
//! let expected = [Sample::saturating(10), Sample::saturating(20)];
//! assert_eq!(rx.try_read_next_cycle(), CycleRead::Ready(expected));
//! assert_eq!(rx.try_read_next_cycle(), CycleRead::Empty);
//! ```

use std::sync::Arc;

use crate::sample::{Cycle, Sample};
use crate::spsc::ring::{ConsumerRole, Cursor, ProducerRole, SlotRing};

/// Result of one attempt to take a cycle off the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleRead<const C: usize> {
    /// A complete cycle; its slots are now EMPTY again.
    Ready(Cycle<C>),
    /// The producer is part-way through this cycle. Nothing was consumed;
    /// retry shortly.
    Pending,
    /// The next slot is EMPTY at a cycle boundary: nothing more is ready.
    Empty,
}

/// Write end of the ring. `Send`, one per ring.
pub struct SampleProducer<const C: usize, const R: usize> {
    ring: Arc<SlotRing<R>>,
    cursor: Cursor<ProducerRole, R>,
}

/// Read end of the ring. `Send`, one per ring.
pub struct SampleConsumer<const C: usize, const R: usize> {
    ring: Arc<SlotRing<R>>,
    cursor: Cursor<ConsumerRole, R>,
}

struct GeometryCheck<const C: usize, const R: usize>;

impl<const C: usize, const R: usize> GeometryCheck<C, R> {
    const OK: () = assert!(
        C > 0 && R > 0 && R % C == 0,
        "ring capacity must be a non-zero multiple of the channel count"
    );
}

/// Creates a ring of `R` slots for cycles of `C` channels, all slots EMPTY.
#[must_use]
pub fn channel<const C: usize, const R: usize>() -> (SampleProducer<C, R>, SampleConsumer<C, R>) {
    let () = GeometryCheck::<C, R>::OK;

    let ring = Arc::new(SlotRing::new());
    let producer = SampleProducer {
        ring: Arc::clone(&ring),
        cursor: Cursor::new(),
    };
    let consumer = SampleConsumer {
        ring,
        cursor: Cursor::new(),
    };
    (producer, consumer)
}

impl<const C: usize, const R: usize> SampleProducer<C, R> {
    /// Checks that the next `C` slots are free.
    ///
    /// Returns `false` and bumps the overflow counter when any of them still
    /// holds unread data; the caller must then skip the whole cycle. Once this
    /// returns `true` the slots stay free until written, since only the
    /// producer fills them.
    pub fn reserve_cycle(&mut self) -> bool {
        debug_assert_eq!(self.cursor.get() % C, 0, "reserve off a cycle boundary");
        let free = (0..C).all(|offset| self.ring.is_vacant(self.cursor.ahead(offset)));
        if !free {
            self.ring.record_overflow();
        }
        free
    }

    /// Stores `value` at the write index and advances it. No backpressure.
    ///
    /// Only valid after a successful [`reserve_cycle`](Self::reserve_cycle)
    /// for the cycle being written.
    #[inline]
    pub fn write(&mut self, value: Sample) {
        self.ring.publish(self.cursor.get(), value);
        self.cursor.advance(1);
    }

    /// Reserves and writes a full cycle. Returns `false` if it was dropped.
    pub fn write_cycle(&mut self, cycle: &Cycle<C>) -> bool {
        if !self.reserve_cycle() {
            return false;
        }
        for &sample in cycle {
            self.write(sample);
        }
        true
    }

    /// Cycles dropped because the ring was full.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.ring.overflows()
    }

    /// Current write index.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor.get()
    }
}

impl<const C: usize, const R: usize> SampleConsumer<C, R> {
    /// Takes the next cycle if all `C` of its slots are filled.
    ///
    /// A partially written cycle is never consumed or skipped: the call reports
    /// [`CycleRead::Pending`] and leaves every slot untouched.
    pub fn try_read_next_cycle(&mut self) -> CycleRead<C> {
        let mut cycle = [Sample::MIN; C];
        for (offset, out) in cycle.iter_mut().enumerate() {
            match self.ring.peek(self.cursor.ahead(offset)) {
                Some(sample) => *out = sample,
                None if offset == 0 => return CycleRead::Empty,
                None => return CycleRead::Pending,
            }
        }
        for offset in 0..C {
            self.ring.clear(self.cursor.ahead(offset));
        }
        self.cursor.advance(C);
        CycleRead::Ready(cycle)
    }

    /// Cycles the producer dropped because the ring was full.
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.ring.overflows()
    }

    /// Current read index.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor.get()
    }
}
