//! Per-variant sample packing.
//!
//! # Byte stream (12-bit)
//!
//! Channels are taken in groups of four. Each group becomes six bytes:
//!
//! ```text
//! [s0>>4][s1>>4][s2>>4][s3>>4][s0&F | s1&F][s2&F | s3&F]
//!                              hi nib  lo   hi nib  lo
//! ```
//!
//! Only the low 12 bits of each sample travel. A trailing partial group is
//! padded with zero samples.
//!
//! # Notification (16-bit)
//!
//! Each sample is two bytes, high byte first.

use crate::sample::Cycle;

/// Channels per byte-stream packing group.
pub const GROUP: usize = 4;
/// Bytes per byte-stream packing group.
pub const GROUP_BYTES: usize = 6;
const TWELVE_BITS: u16 = 0x0FFF;

/// Bytes one byte-stream cycle of `channels` samples occupies.
#[must_use]
pub const fn byte_stream_cycle_len(channels: usize) -> usize {
    channels.div_ceil(GROUP) * GROUP_BYTES
}

/// Bytes one notification cycle of `channels` samples occupies.
#[must_use]
pub const fn notification_cycle_len(channels: usize) -> usize {
    channels * 2
}

/// Appends one cycle in the 12-bit byte-stream layout.
pub fn pack_byte_stream<const C: usize>(cycle: &Cycle<C>, out: &mut Vec<u8>) {
    for group in cycle.chunks(GROUP) {
        let mut v = [0u16; GROUP];
        for (dst, s) in v.iter_mut().zip(group) {
            *dst = s.get() & TWELVE_BITS;
        }
        out.extend(v.map(|s| (s >> 4) as u8));
        out.push(((v[0] & 0xF) << 4 | (v[1] & 0xF)) as u8);
        out.push(((v[2] & 0xF) << 4 | (v[3] & 0xF)) as u8);
    }
}

/// Recovers the 12-bit values of one byte-stream cycle.
///
/// `bytes` must be exactly [`byte_stream_cycle_len`]`(C)` long; padding
/// samples of a partial trailing group are discarded.
#[must_use]
pub fn unpack_byte_stream<const C: usize>(bytes: &[u8]) -> [u16; C] {
    debug_assert_eq!(bytes.len(), byte_stream_cycle_len(C));
    let mut out = [0u16; C];
    for (g, chunk) in bytes.chunks_exact(GROUP_BYTES).enumerate() {
        let group = [
            (u16::from(chunk[0]) << 4) | (u16::from(chunk[4]) >> 4),
            (u16::from(chunk[1]) << 4) | (u16::from(chunk[4]) & 0xF),
            (u16::from(chunk[2]) << 4) | (u16::from(chunk[5]) >> 4),
            (u16::from(chunk[3]) << 4) | (u16::from(chunk[5]) & 0xF),
        ];
        for (i, value) in group.into_iter().enumerate() {
            if let Some(dst) = out.get_mut(g * GROUP + i) {
                *dst = value;
            }
        }
    }
    out
}

/// Appends one cycle in the 16-bit notification layout.
pub fn pack_notification<const C: usize>(cycle: &Cycle<C>, out: &mut Vec<u8>) {
    for s in cycle {
        out.extend_from_slice(&s.get().to_be_bytes());
    }
}

/// Recovers one notification cycle.
#[must_use]
pub fn unpack_notification<const C: usize>(bytes: &[u8]) -> [u16; C] {
    debug_assert_eq!(bytes.len(), notification_cycle_len(C));
    let mut out = [0u16; C];
    for (dst, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *dst = u16::from_be_bytes([pair[0], pair[1]]);
    }
    out
}
