//! Frame variants and the buffer a frame is assembled in.
//!
//! ## Wire Format
//!
//! All multi-byte header integers are little-endian.
//!
//! | Variant      | Layout |
//! |--------------|--------|
//! | Byte stream  | `[delim:8 "emg_data"][run_id:8][first_cycle:8][len:2][payload]` |
//! | Notification | `[run_id:8][first_cycle:8][payload]` |
//!
//! The byte-stream `len` is the total frame length including the header. A
//! notification is one message, so its length is implicit.

use std::marker::PhantomData;

use crate::config::ConfigError;
use crate::data::packing;
use crate::sample::{Cycle, RunId};

/// Resynchronization marker opening every byte-stream frame.
pub const DELIMITER: [u8; 8] = *b"emg_data";

/// Byte offset of the byte-stream length field.
pub(crate) const LEN_OFFSET: usize = 24;

/// Largest frame the byte-stream length field can describe.
pub const MAX_BYTE_STREAM_FRAME: usize = u16::MAX as usize;

/// Wire layout of one frame variant.
pub trait FrameFormat: Send + 'static {
    /// Short name for logs.
    const NAME: &'static str;
    /// Header bytes preceding the payload.
    const HEADER_LEN: usize;
    /// Default frame size limit, header included.
    const DEFAULT_MAX_FRAME: usize;
    /// Upper bound a configured limit may not exceed.
    const MAX_FRAME_LIMIT: usize;

    /// Payload bytes for one cycle of `channels` samples.
    fn cycle_len(channels: usize) -> usize;

    /// Appends the header for a frame starting at `first_cycle`.
    fn write_header(buf: &mut Vec<u8>, run_id: RunId, first_cycle: u64);

    /// Appends one packed cycle.
    fn pack_cycle<const C: usize>(cycle: &Cycle<C>, buf: &mut Vec<u8>);

    /// Patches header fields that depend on the finished payload.
    fn finalize(frame: &mut [u8]);
}

/// Ordered byte-stream variant: delimited header, 12-bit samples.
#[derive(Debug, Clone, Copy)]
pub struct ByteStream;

/// Notification variant: short header, full 16-bit samples.
#[derive(Debug, Clone, Copy)]
pub struct Notification;

impl FrameFormat for ByteStream {
    const NAME: &'static str = "byte-stream";
    const HEADER_LEN: usize = 26;
    // 80 four-channel cycles.
    const DEFAULT_MAX_FRAME: usize = 508;
    const MAX_FRAME_LIMIT: usize = MAX_BYTE_STREAM_FRAME;

    fn cycle_len(channels: usize) -> usize {
        packing::byte_stream_cycle_len(channels)
    }

    fn write_header(buf: &mut Vec<u8>, run_id: RunId, first_cycle: u64) {
        buf.extend_from_slice(&DELIMITER);
        buf.extend_from_slice(&run_id.to_le_bytes());
        buf.extend_from_slice(&first_cycle.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
    }

    fn pack_cycle<const C: usize>(cycle: &Cycle<C>, buf: &mut Vec<u8>) {
        packing::pack_byte_stream(cycle, buf);
    }

    fn finalize(frame: &mut [u8]) {
        // The buffer enforces MAX_BYTE_STREAM_FRAME, so the length fits.
        let len = u16::try_from(frame.len()).unwrap_or(u16::MAX);
        frame[LEN_OFFSET..LEN_OFFSET + 2].copy_from_slice(&len.to_le_bytes());
    }
}

impl FrameFormat for Notification {
    const NAME: &'static str = "notification";
    const HEADER_LEN: usize = 16;
    // 28 four-channel cycles.
    const DEFAULT_MAX_FRAME: usize = Self::HEADER_LEN + 28 * 8;
    const MAX_FRAME_LIMIT: usize = 512;

    fn cycle_len(channels: usize) -> usize {
        packing::notification_cycle_len(channels)
    }

    fn write_header(buf: &mut Vec<u8>, run_id: RunId, first_cycle: u64) {
        buf.extend_from_slice(&run_id.to_le_bytes());
        buf.extend_from_slice(&first_cycle.to_le_bytes());
    }

    fn pack_cycle<const C: usize>(cycle: &Cycle<C>, buf: &mut Vec<u8>) {
        packing::pack_notification(cycle, buf);
    }

    fn finalize(_frame: &mut [u8]) {}
}

/// Accumulates packed cycles behind a header, up to a size limit.
///
/// # Usage
/// ```
/// use emgstream::data::{ByteStream, FrameBuffer, FrameFormat};
/// use emgstream::sample::{RunId, Sample};
///
/// let mut frame = FrameBuffer::<ByteStream>::new(ByteStream::DEFAULT_MAX_FRAME, 4).unwrap();
/// frame.begin(RunId(7), 0);
/// assert!(frame.push_cycle(&[Sample::saturating(1000); 4]));
/// let bytes = frame.finish();
/// assert_eq!(bytes.len(), 26 + 6);
/// assert_eq!(&bytes[24..26], &32u16.to_le_bytes());
/// ```
#[derive(Debug)]
pub struct FrameBuffer<F: FrameFormat> {
    buf: Vec<u8>,
    max_len: usize,
    cycle_len: usize,
    cycles: usize,
    _format: PhantomData<F>,
}

impl<F: FrameFormat> FrameBuffer<F> {
    /// Creates an empty buffer for `channels`-wide cycles.
    ///
    /// # Errors
    /// [`ConfigError::NoChannels`] for zero-width cycles,
    /// [`ConfigError::FrameTooSmall`] if no cycle fits after the header,
    /// [`ConfigError::FrameTooLarge`] past the variant's limit.
    pub fn new(max_len: usize, channels: usize) -> Result<Self, ConfigError> {
        if channels == 0 {
            return Err(ConfigError::NoChannels);
        }
        let cycle_len = F::cycle_len(channels);
        let needed = F::HEADER_LEN + cycle_len;
        if max_len < needed {
            return Err(ConfigError::FrameTooSmall { max_len, needed });
        }
        if max_len > F::MAX_FRAME_LIMIT {
            return Err(ConfigError::FrameTooLarge {
                max_len,
                limit: F::MAX_FRAME_LIMIT,
            });
        }
        Ok(Self {
            buf: Vec::with_capacity(max_len),
            max_len,
            cycle_len,
            cycles: 0,
            _format: PhantomData,
        })
    }

    /// Drops any content and writes a fresh header.
    pub fn begin(&mut self, run_id: RunId, first_cycle: u64) {
        self.buf.clear();
        self.cycles = 0;
        F::write_header(&mut self.buf, run_id, first_cycle);
    }

    /// Whether one more cycle fits under the limit.
    #[inline]
    #[must_use]
    pub fn can_fit_cycle(&self) -> bool {
        self.buf.len() + self.cycle_len <= self.max_len
    }

    /// Appends a cycle. Returns `false` (and appends nothing) if it does not fit.
    pub fn push_cycle<const C: usize>(&mut self, cycle: &Cycle<C>) -> bool {
        if !self.can_fit_cycle() {
            return false;
        }
        F::pack_cycle(cycle, &mut self.buf);
        self.cycles += 1;
        true
    }

    /// Cycles appended since [`begin`](Self::begin).
    #[inline]
    #[must_use]
    pub const fn cycle_count(&self) -> usize {
        self.cycles
    }

    #[inline]
    #[must_use]
    pub const fn has_payload(&self) -> bool {
        self.cycles > 0
    }

    /// Most cycles a single frame can carry.
    #[must_use]
    pub const fn cycles_per_frame(&self) -> usize {
        (self.max_len - F::HEADER_LEN) / self.cycle_len
    }

    /// Finalizes the header and returns the complete frame.
    pub fn finish(&mut self) -> &[u8] {
        F::finalize(&mut self.buf);
        &self.buf
    }
}
