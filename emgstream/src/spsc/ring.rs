//! Sentinel-marked slot array shared by one producer and one consumer.
//!
//! There are no shared head/tail indices. Each side keeps its own cursor and
//! the slot contents carry the handoff: a slot holding [`Sample::EMPTY_RAW`]
//! belongs to the producer, any other value belongs to the consumer.
//!
//! # Ordering
//!
//! - The producer publishes a value with `Release`; the consumer observes it
//!   with `Acquire`, so it sees the finished value.
//! - The consumer clears with `Release` after it has copied the value out; the
//!   producer checks for EMPTY with `Acquire` before reusing the slot.
//!
//! Each slot is a single `AtomicU16`, so a reader can never observe half a
//! sample.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use crate::sample::Sample;

/// Role marker: cursor advanced only by the producer.
pub struct ProducerRole;

/// Role marker: cursor advanced only by the consumer.
pub struct ConsumerRole;

/// Slot index owned by one side of the ring, always in `[0, R)`.
///
/// The role parameter keeps a producer cursor from being handed to consumer
/// code by accident; at runtime it is a plain `usize`.
pub struct Cursor<Role, const R: usize> {
    index: usize,
    _role: PhantomData<Role>,
}

impl<Role, const R: usize> Cursor<Role, R> {
    pub const fn new() -> Self {
        Self {
            index: 0,
            _role: PhantomData,
        }
    }

    #[inline]
    pub const fn get(&self) -> usize {
        self.index
    }

    /// Index `offset` slots ahead, wrapping at `R`.
    #[inline]
    pub const fn ahead(&self, offset: usize) -> usize {
        let next = self.index + offset;
        if next >= R { next - R } else { next }
    }

    /// Moves the cursor `by` slots forward, wrapping at `R`.
    #[inline]
    pub fn advance(&mut self, by: usize) {
        self.index = self.ahead(by);
    }
}

/// Slot storage plus the shared overflow counter.
pub struct SlotRing<const R: usize> {
    slots: Box<[AtomicU16]>,
    overflows: AtomicU64,
}

impl<const R: usize> SlotRing<R> {
    /// Creates a ring with every slot EMPTY.
    pub fn new() -> Self {
        let slots = (0..R)
            .map(|_| AtomicU16::new(Sample::EMPTY_RAW))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            overflows: AtomicU64::new(0),
        }
    }

    /// Publishes `value` into slot `index`. Producer only.
    #[inline]
    pub fn publish(&self, index: usize, value: Sample) {
        self.slots[index].store(value.get(), Ordering::Release);
    }

    /// Returns the sample in slot `index`, or `None` if it is EMPTY.
    #[inline]
    pub fn peek(&self, index: usize) -> Option<Sample> {
        let raw = self.slots[index].load(Ordering::Acquire);
        (raw != Sample::EMPTY_RAW).then(|| Sample::from_slot(raw))
    }

    /// Returns slot `index` to the producer. Consumer only.
    #[inline]
    pub fn clear(&self, index: usize) {
        self.slots[index].store(Sample::EMPTY_RAW, Ordering::Release);
    }

    #[inline]
    pub fn is_vacant(&self, index: usize) -> bool {
        self.slots[index].load(Ordering::Acquire) == Sample::EMPTY_RAW
    }

    #[inline]
    pub fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_empty() {
        let ring = SlotRing::<8>::new();
        for i in 0..8 {
            assert!(ring.is_vacant(i));
            assert_eq!(ring.peek(i), None);
        }
    }

    #[test]
    fn publish_then_clear() {
        let ring = SlotRing::<4>::new();
        ring.publish(2, Sample::saturating(1234));
        assert_eq!(ring.peek(2), Some(Sample::saturating(1234)));
        assert!(!ring.is_vacant(2));
        ring.clear(2);
        assert!(ring.is_vacant(2));
    }

    #[test]
    fn cursor_wraps_at_capacity() {
        let mut cursor = Cursor::<ProducerRole, 8>::new();
        cursor.advance(4);
        assert_eq!(cursor.get(), 4);
        assert_eq!(cursor.ahead(5), 1);
        cursor.advance(4);
        assert_eq!(cursor.get(), 0);
    }
}
