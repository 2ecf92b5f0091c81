//! Receiver side: frame parsing, stream resynchronization, continuity checks.
//!
//! [`StreamDecoder`] consumes an arbitrary chunked byte stream, scans for the
//! `emg_data` delimiter, and yields complete byte-stream frames. Garbage
//! between frames, and frames whose declared length is inconsistent, are
//! skipped; decoding continues at the next delimiter.
//!
//! [`GapTracker`] compares each frame's run id and first-cycle index against
//! the previous frame to spot dropped frames and device restarts.

use serde::Serialize;
use thiserror::Error;

use crate::data::frame::{ByteStream, DELIMITER, FrameFormat, LEN_OFFSET, Notification};
use crate::data::packing;
use crate::sample::RunId;
use crate::trace::{debug, trace};

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedFrame {
    pub run_id: RunId,
    /// Absolute index of `cycles[0]` within the run.
    pub first_cycle: u64,
    /// One inner vector of channel values per cycle.
    pub cycles: Vec<Vec<u16>>,
}

impl DecodedFrame {
    /// Index one past the last cycle in this frame.
    #[must_use]
    pub fn end_cycle(&self) -> u64 {
        self.first_cycle + self.cycles.len() as u64
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the header needs.
    #[error("frame of {got} bytes is shorter than its {needed} byte header")]
    Truncated { needed: usize, got: usize },
    /// Byte-stream frame without the leading delimiter.
    #[error("frame does not start with the emg_data delimiter")]
    MissingDelimiter,
    /// Length field disagrees with the bytes present or the cycle size.
    #[error("declared length {declared} does not fit a {actual} byte frame of {cycle_len} byte cycles")]
    BadLength {
        declared: usize,
        actual: usize,
        cycle_len: usize,
    },
    /// Payload is not a whole number of cycles.
    #[error("payload of {len} bytes is not a multiple of the {cycle_len} byte cycle")]
    RaggedPayload { len: usize, cycle_len: usize },
}

/// Little-endian header reader with bounds checks.
struct HeaderReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> HeaderReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.cursor + N;
        let bytes = self.buf.get(self.cursor..end).ok_or(DecodeError::Truncated {
            needed: end,
            got: self.buf.len(),
        })?;
        self.cursor = end;
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        Ok(arr)
    }

    fn take_u16(&mut self) -> Result<u16, DecodeError> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.cursor..]
    }
}

fn unpack_cycles<const C: usize>(
    payload: &[u8],
    cycle_len: usize,
    unpack: fn(&[u8]) -> [u16; C],
) -> Result<Vec<Vec<u16>>, DecodeError> {
    if payload.len() % cycle_len != 0 {
        return Err(DecodeError::RaggedPayload {
            len: payload.len(),
            cycle_len,
        });
    }
    Ok(payload
        .chunks_exact(cycle_len)
        .map(|chunk| unpack(chunk).to_vec())
        .collect())
}

/// Decodes one complete byte-stream frame of `C`-channel cycles.
///
/// # Errors
/// [`DecodeError`] if the delimiter, length field or payload is malformed.
pub fn decode_byte_stream<const C: usize>(frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let mut r = HeaderReader::new(frame);
    if r.take::<8>()? != DELIMITER {
        return Err(DecodeError::MissingDelimiter);
    }
    let run_id = RunId(r.take_u64()?);
    let first_cycle = r.take_u64()?;
    let declared = usize::from(r.take_u16()?);
    let cycle_len = ByteStream::cycle_len(C);
    if declared != frame.len() {
        return Err(DecodeError::BadLength {
            declared,
            actual: frame.len(),
            cycle_len,
        });
    }
    let cycles = unpack_cycles::<C>(r.rest(), cycle_len, packing::unpack_byte_stream::<C>)?;
    Ok(DecodedFrame {
        run_id,
        first_cycle,
        cycles,
    })
}

/// Decodes one notification message of `C`-channel cycles.
///
/// # Errors
/// [`DecodeError`] if the header is short or the payload is ragged.
pub fn decode_notification<const C: usize>(message: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let mut r = HeaderReader::new(message);
    let run_id = RunId(r.take_u64()?);
    let first_cycle = r.take_u64()?;
    let cycles = unpack_cycles::<C>(
        r.rest(),
        Notification::cycle_len(C),
        packing::unpack_notification::<C>,
    )?;
    Ok(DecodedFrame {
        run_id,
        first_cycle,
        cycles,
    })
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|w| w == DELIMITER)
}

/// Incremental byte-stream decoder.
///
/// # Usage
/// ```
/// use emgstream::data::StreamDecoder;
///
/// let mut decoder = StreamDecoder::<4>::new();
/// decoder.push(b"line noise");
/// assert!(decoder.next_frame().is_none());
/// assert_eq!(decoder.skipped_bytes(), 3);
/// ```
#[derive(Debug, Default)]
pub struct StreamDecoder<const C: usize> {
    buf: Vec<u8>,
    skipped: u64,
    rejected: u64,
}

impl<const C: usize> StreamDecoder<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            skipped: 0,
            rejected: 0,
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes discarded while hunting for a delimiter.
    #[must_use]
    pub const fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Frames found but rejected as malformed.
    #[must_use]
    pub const fn rejected_frames(&self) -> u64 {
        self.rejected
    }

    fn discard(&mut self, n: usize) {
        self.buf.drain(..n);
        self.skipped += n as u64;
    }

    /// Returns the next frame, an error for a malformed one, or `None` when
    /// more input is needed.
    ///
    /// After an error the decoder has already moved past the bad frame; call
    /// again to continue.
    pub fn next_frame(&mut self) -> Option<Result<DecodedFrame, DecodeError>> {
        match find_delimiter(&self.buf) {
            Some(0) => {}
            Some(at) => {
                trace!(bytes = at, "skipping to delimiter");
                self.discard(at);
            }
            None => {
                // A delimiter may straddle the chunk boundary.
                let keep = self.buf.len().min(DELIMITER.len() - 1);
                self.discard(self.buf.len() - keep);
                return None;
            }
        }

        if self.buf.len() < ByteStream::HEADER_LEN {
            return None;
        }
        let declared =
            usize::from(u16::from_le_bytes([self.buf[LEN_OFFSET], self.buf[LEN_OFFSET + 1]]));
        let cycle_len = ByteStream::cycle_len(C);
        let plausible = declared >= ByteStream::HEADER_LEN
            && (declared - ByteStream::HEADER_LEN) % cycle_len == 0;
        let available = self.buf.len().min(declared);
        // A second delimiter inside the claimed frame means this one was cut short.
        let cut_short = plausible && find_delimiter(&self.buf[1..available]).is_some();

        if !plausible || cut_short {
            debug!(declared, "malformed frame header, resynchronizing");
            self.rejected += 1;
            self.discard(1);
            return Some(Err(DecodeError::BadLength {
                declared,
                actual: available,
                cycle_len,
            }));
        }
        if self.buf.len() < declared {
            return None;
        }

        let frame = self.buf.drain(..declared).collect::<Vec<_>>();
        Some(decode_byte_stream::<C>(&frame).inspect_err(|_| self.rejected += 1))
    }
}

/// How a frame relates to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Continuity {
    /// First frame seen.
    Start,
    /// Picks up exactly where the previous frame ended.
    Contiguous,
    /// `missing` cycles were lost between the frames.
    Gap { missing: u64 },
    /// Starts before the previous frame ended.
    Overlap { repeated: u64 },
    /// The run id changed: the device restarted.
    Reset { previous: RunId },
}

/// Tracks run id and cycle continuity across frames.
#[derive(Debug, Default)]
pub struct GapTracker {
    last: Option<(RunId, u64)>,
    missing_total: u64,
    resets: u64,
}

impl GapTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `frame` and records it as the latest.
    pub fn observe(&mut self, frame: &DecodedFrame) -> Continuity {
        let previous = self.last.replace((frame.run_id, frame.end_cycle()));
        match previous {
            None => Continuity::Start,
            Some((run_id, _)) if run_id != frame.run_id => {
                self.resets += 1;
                Continuity::Reset { previous: run_id }
            }
            Some((_, expected)) if frame.first_cycle == expected => Continuity::Contiguous,
            Some((_, expected)) if frame.first_cycle > expected => {
                let missing = frame.first_cycle - expected;
                self.missing_total += missing;
                Continuity::Gap { missing }
            }
            Some((_, expected)) => Continuity::Overlap {
                repeated: expected - frame.first_cycle,
            },
        }
    }

    /// Cycles lost over the whole session.
    #[must_use]
    pub const fn missing_cycles(&self) -> u64 {
        self.missing_total
    }

    #[must_use]
    pub const fn resets(&self) -> u64 {
        self.resets
    }
}
