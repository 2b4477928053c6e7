//! Encoder contract.
//!
//! An encoder is bound to one composed [`MediaStream`] and reports its output
//! asynchronously through [`EncoderEvents`]: a sequence of opaque chunks,
//! optional error notices, and exactly one terminal event. That is
//! `Finished` once `stop` has drained the output, or `Failed` when the
//! encoder dies before it could finalize.

use classcast_common::error::ClasscastResult;
use classcast_platform_core::MediaStream;
use tokio::sync::mpsc;

/// Something the encoder reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A unit of encoded output. May be empty.
    Chunk(Vec<u8>),
    /// A non-fatal problem inside the encoder.
    Error(String),
    /// Finalization completed; no chunk follows this event.
    Finished,
    /// The encoder died without finalizing; no chunk follows this event.
    Failed(String),
}

/// Sending half of an encoder's event channel.
#[derive(Debug, Clone)]
pub struct EncoderEvents {
    tx: mpsc::UnboundedSender<EncoderEvent>,
}

impl EncoderEvents {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EncoderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit a chunk. Returns false once the session stopped listening.
    pub fn chunk(&self, data: Vec<u8>) -> bool {
        self.tx.send(EncoderEvent::Chunk(data)).is_ok()
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.tx.send(EncoderEvent::Error(message.into())).is_ok()
    }

    pub fn finished(&self) -> bool {
        self.tx.send(EncoderEvent::Finished).is_ok()
    }

    pub fn failed(&self, message: impl Into<String>) -> bool {
        self.tx.send(EncoderEvent::Failed(message.into())).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Lifecycle state of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// A running encoder bound to one stream.
pub trait MediaEncoder: Send + Sync {
    /// Begin producing chunks.
    fn start(&mut self) -> ClasscastResult<()>;

    /// Suspend output without releasing sources.
    fn pause(&mut self) -> ClasscastResult<()>;

    /// Continue output after a pause.
    fn resume(&mut self) -> ClasscastResult<()>;

    /// Request finalization.
    ///
    /// Returns without waiting; the remaining chunks and then `Finished`
    /// arrive on the event channel.
    fn stop(&mut self) -> ClasscastResult<()>;

    fn state(&self) -> EncoderState;
}

/// Builds encoders for composed streams.
pub trait EncoderFactory: Send + Sync {
    fn create(
        &self,
        stream: &MediaStream,
        events: EncoderEvents,
    ) -> ClasscastResult<Box<dyn MediaEncoder>>;
}
