//! ClassCast Capture Engine
//!
//! Runs one recording session at a time: acquires display, camera, and
//! microphone streams from the host, drives an encoder over the composed
//! stream, buffers its chunks in arrival order, and assembles the finished
//! recording when the session stops.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │               CaptureSessionManager               │
//! │  ┌──────────────┐   ┌─────────────┐               │
//! │  │ MediaDevices │──▶│ MediaStream │ (composed)    │
//! │  └──────────────┘   └──────┬──────┘               │
//! │                            ▼                      │
//! │  ┌──────────────┐   EncoderEvent   ┌───────────┐  │
//! │  │ MediaEncoder │ ───────────────▶ │ Collector │  │
//! │  └──────────────┘                  └─────┬─────┘  │
//! │                                          ▼        │
//! │                ChunkBuffer ──stop──▶ RecordingArtifact
//! └───────────────────────────────────────────────────┘
//! ```

pub mod encoder;
pub mod pipeline;
pub mod recorder;
pub mod request;
pub mod session;
pub mod synthetic;

pub use encoder::{EncoderEvent, EncoderEvents, EncoderFactory, EncoderState, MediaEncoder};
pub use recorder::{ChunkBuffer, EncodedChunk, RecordingArtifact};
pub use request::CaptureRequest;
pub use session::*;
