//! Wire format, transports and the receiving side.

pub mod decode;
pub mod frame;
pub mod packing;
pub mod transport;

pub use decode::{
    Continuity, DecodeError, DecodedFrame, GapTracker, StreamDecoder, decode_byte_stream,
    decode_notification,
};
pub use frame::{ByteStream, DELIMITER, FrameBuffer, FrameFormat, Notification};
pub use transport::{
    ByteStreamSink, FlushOutcome, MemoryNotifier, NotificationSink, Notifier, NotifyError,
    Readiness, SinkStats, TransportSink,
};
