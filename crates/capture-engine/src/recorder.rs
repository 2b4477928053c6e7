//! Chunk buffering and artifact assembly.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use classcast_common::error::ClasscastResult;
use tokio::sync::mpsc;

use crate::encoder::EncoderEvent;
use crate::request::CaptureRequest;

/// One unit of encoded output, numbered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub seq: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct BufferInner {
    chunks: Vec<EncodedChunk>,
    total_bytes: u64,
    next_seq: u64,
    discarded_empty: u64,
    sealed: bool,
}

/// Append-only chunk store shared between the collector task and the session.
///
/// `take` seals the buffer: the chunks are handed out exactly once and any
/// later push is rejected.
#[derive(Debug, Clone, Default)]
pub struct ChunkBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk. Empty chunks are counted and dropped.
    pub fn push(&self, data: Vec<u8>) -> bool {
        let mut inner = self.lock();
        if inner.sealed {
            return false;
        }
        if data.is_empty() {
            inner.discarded_empty += 1;
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.total_bytes += data.len() as u64;
        inner.chunks.push(EncodedChunk { seq, data });
        true
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    pub fn discarded_empty(&self) -> u64 {
        self.lock().discarded_empty
    }

    /// Seal the buffer and hand out everything collected so far.
    pub fn take(&self) -> Vec<EncodedChunk> {
        let mut inner = self.lock();
        inner.sealed = true;
        std::mem::take(&mut inner.chunks)
    }
}

/// How the collector task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorExit {
    /// The encoder reported finalization.
    Finished,
    /// The encoder reported a fatal error before finalizing.
    Failed,
    /// Every sender was dropped without a terminal event.
    Disconnected,
}

/// Drain encoder events into `buffer` until the encoder finalizes.
pub async fn collect_chunks(
    mut events: mpsc::UnboundedReceiver<EncoderEvent>,
    buffer: ChunkBuffer,
) -> CollectorExit {
    while let Some(event) = events.recv().await {
        match event {
            EncoderEvent::Chunk(data) => {
                let len = data.len();
                if !buffer.push(data) {
                    tracing::trace!(len, "Chunk not buffered");
                }
            }
            EncoderEvent::Error(message) => {
                tracing::warn!(error = %message, "Encoder reported an error");
            }
            EncoderEvent::Finished => {
                tracing::debug!(
                    chunks = buffer.len(),
                    bytes = buffer.total_bytes(),
                    "Encoder finalized"
                );
                return CollectorExit::Finished;
            }
            EncoderEvent::Failed(message) => {
                tracing::error!(
                    error = %message,
                    chunks = buffer.len(),
                    "Encoder failed before finalizing"
                );
                return CollectorExit::Failed;
            }
        }
    }
    CollectorExit::Disconnected
}

/// The finished recording of one session.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    data: Vec<u8>,
    mime_type: String,
    mode: CaptureRequest,
    chunk_count: usize,
    started_at: DateTime<Utc>,
    duration: Duration,
    complete: bool,
}

impl RecordingArtifact {
    /// Concatenate chunks in sequence order into one blob.
    pub fn assemble(
        chunks: Vec<EncodedChunk>,
        mime_type: impl Into<String>,
        mode: CaptureRequest,
        started_at: DateTime<Utc>,
        duration: Duration,
        complete: bool,
    ) -> Self {
        let size = chunks.iter().map(|c| c.data.len()).sum();
        let mut data = Vec::with_capacity(size);
        let chunk_count = chunks.len();
        for chunk in chunks {
            data.extend_from_slice(&chunk.data);
        }
        Self {
            data,
            mime_type: mime_type.into(),
            mode,
            chunk_count,
            started_at,
            duration,
            complete,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn mode(&self) -> CaptureRequest {
        self.mode
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Active recording time, pauses excluded.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// False when the encoder never confirmed finalization (timeout or
    /// encoder failure); the data is whatever had arrived by then.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// File extension matching the container type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.split(';').next().map(str::trim) {
            Some("video/webm") | Some("audio/webm") => "webm",
            Some("video/x-matroska") => "mkv",
            Some("video/mp4") => "mp4",
            Some("audio/ogg") => "ogg",
            _ => "bin",
        }
    }

    /// Write the blob to disk, creating parent directories.
    pub fn write_to(&self, path: &Path) -> ClasscastResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.data)?;
        tracing::info!(path = %path.display(), bytes = self.data.len(), "Recording written");
        Ok(())
    }
}
