//! Sinks that carry finished frames off the device.
//!
//! Two transports exist:
//!
//! - [`ByteStreamSink`] over any [`Write`]: always accepts, best effort
//! - [`NotificationSink`] over a [`Notifier`]: sends only while a peer has
//!   subscribed, as signalled through a shared [`Readiness`] flag
//!
//! Neither sink blocks on, retries, or acknowledges a frame. A frame that
//! cannot go out is counted and forgotten.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

use crate::trace::{debug, info, warn};

/// What happened to one flushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Sent,
    /// Not ready, or the write failed.
    Dropped,
}

/// Running totals kept by every sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
    /// Write or radio failures (a subset of `frames_dropped`).
    pub errors: u64,
}

impl SinkStats {
    fn sent(&mut self, len: usize) -> FlushOutcome {
        self.frames_sent += 1;
        self.bytes_sent += len as u64;
        FlushOutcome::Sent
    }

    fn dropped(&mut self) -> FlushOutcome {
        self.frames_dropped += 1;
        FlushOutcome::Dropped
    }

    fn failed(&mut self) -> FlushOutcome {
        self.errors += 1;
        self.dropped()
    }
}

/// Destination for finished frames.
pub trait TransportSink: Send {
    /// Hands over one complete frame. Never blocks waiting for a peer.
    fn flush(&mut self, frame: &[u8]) -> FlushOutcome;

    fn stats(&self) -> SinkStats;
}

/// Byte-stream transport over a writer (serial port, pipe, stdout).
pub struct ByteStreamSink<W: Write + Send> {
    writer: W,
    stats: SinkStats,
}

impl<W: Write + Send> ByteStreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            stats: SinkStats::default(),
        }
    }

    /// Returns the writer, e.g. to inspect an in-memory buffer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TransportSink for ByteStreamSink<W> {
    fn flush(&mut self, frame: &[u8]) -> FlushOutcome {
        let result = self
            .writer
            .write_all(frame)
            .and_then(|()| self.writer.flush());
        match result {
            Ok(()) => self.stats.sent(frame.len()),
            Err(e) => {
                warn!(error = %e, len = frame.len(), "byte stream write failed, frame lost");
                self.stats.failed()
            }
        }
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}

/// Shared "a peer wants notifications" flag.
///
/// Set and cleared by the connection layer; read by the sink before every
/// send. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Failure reported by a radio for a single message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The peer went away; readiness is withdrawn until it resubscribes.
    #[error("peer disconnected")]
    Disconnected,
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Message-oriented radio link, one frame per message.
pub trait Notifier: Send {
    /// Queues one message to the subscribed peer.
    ///
    /// # Errors
    /// Any [`NotifyError`]; the frame is then dropped.
    fn notify(&mut self, message: &[u8]) -> Result<(), NotifyError>;
}

/// Notification transport gated on [`Readiness`].
pub struct NotificationSink<N: Notifier> {
    notifier: N,
    readiness: Readiness,
    stats: SinkStats,
}

impl<N: Notifier> NotificationSink<N> {
    pub fn new(notifier: N, readiness: Readiness) -> Self {
        Self {
            notifier,
            readiness,
            stats: SinkStats::default(),
        }
    }
}

impl<N: Notifier> TransportSink for NotificationSink<N> {
    fn flush(&mut self, frame: &[u8]) -> FlushOutcome {
        if !self.readiness.is_ready() {
            return self.stats.dropped();
        }
        match self.notifier.notify(frame) {
            Ok(()) => self.stats.sent(frame.len()),
            Err(NotifyError::Disconnected) => {
                info!("peer disconnected, holding notifications");
                self.readiness.set(false);
                self.stats.failed()
            }
            Err(e) => {
                debug!(error = %e, "notification dropped");
                self.stats.failed()
            }
        }
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}

/// In-memory [`Notifier`] that keeps every message. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything received so far.
    #[must_use]
    pub fn take(&self) -> Vec<Vec<u8>> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *messages)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&mut self, message: &[u8]) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FlakyRadio {
        fail_with: Option<NotifyError>,
    }

    impl Notifier for FlakyRadio {
        fn notify(&mut self, _message: &[u8]) -> Result<(), NotifyError> {
            self.fail_with.clone().map_or(Ok(()), Err)
        }
    }

    #[test]
    fn byte_stream_writes_whole_frames() {
        let mut sink = ByteStreamSink::new(Vec::new());
        assert_eq!(sink.flush(b"abc"), FlushOutcome::Sent);
        assert_eq!(sink.flush(b"defg"), FlushOutcome::Sent);
        let stats = sink.stats();
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_sent, 7);
        assert_eq!(sink.into_inner(), b"abcdefg");
    }

    #[test]
    fn byte_stream_errors_are_counted_not_raised() {
        let mut sink = ByteStreamSink::new(FailingWriter);
        assert_eq!(sink.flush(b"abc"), FlushOutcome::Dropped);
        let stats = sink.stats();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.frames_sent, 0);
    }

    #[test]
    fn notification_waits_for_readiness() {
        let radio = MemoryNotifier::new();
        let readiness = Readiness::new();
        let mut sink = NotificationSink::new(radio.clone(), readiness.clone());

        assert_eq!(sink.flush(b"one"), FlushOutcome::Dropped);
        readiness.set(true);
        assert_eq!(sink.flush(b"two"), FlushOutcome::Sent);

        assert_eq!(radio.take(), vec![b"two".to_vec()]);
        let stats = sink.stats();
        assert_eq!((stats.frames_sent, stats.frames_dropped, stats.errors), (1, 1, 0));
    }

    #[test]
    fn disconnect_withdraws_readiness() {
        let readiness = Readiness::new();
        readiness.set(true);
        let radio = FlakyRadio {
            fail_with: Some(NotifyError::Disconnected),
        };
        let mut sink = NotificationSink::new(radio, readiness.clone());
        assert_eq!(sink.flush(b"x"), FlushOutcome::Dropped);
        assert!(!readiness.is_ready());
        assert_eq!(sink.stats().errors, 1);
    }

    #[test]
    fn rejected_message_keeps_readiness() {
        let readiness = Readiness::new();
        readiness.set(true);
        let radio = FlakyRadio {
            fail_with: Some(NotifyError::Rejected("queue full".into())),
        };
        let mut sink = NotificationSink::new(radio, readiness.clone());
        assert_eq!(sink.flush(b"x"), FlushOutcome::Dropped);
        assert!(readiness.is_ready());
    }
}
