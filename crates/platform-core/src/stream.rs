//! Live media tracks and streams.
//!
//! A [`MediaTrack`] is a handle to one live source of samples. Clones of a
//! track share the same ready state, so a track that appears both in an
//! acquired stream and in a composed stream is stopped exactly once no
//! matter which handle releases it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of samples a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where a track's samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    /// Screen, window, or tab sharing.
    Display,
    Camera,
    Microphone,
}

/// Ready state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// A handle to one live audio or video source.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    device: Option<String>,
    ended: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, source: TrackSource, label: impl Into<String>) -> Self {
        let n = NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("track-{n}"),
            kind,
            source,
            label: label.into(),
            device: None,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach the backend device identifier (e.g. `/dev/video0`).
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Mark the track ended.
    ///
    /// Idempotent across all clones. Returns true only for the call that
    /// actually ended the track.
    pub fn stop(&self) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!(track = %self.id, kind = ?self.kind, source = ?self.source, "Track stopped");
        true
    }
}

/// An ordered set of tracks acquired together.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        let n = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("stream-{n}"),
            tracks,
        }
    }

    /// Build one logical stream from the union of the given streams' tracks.
    ///
    /// Track order follows the input order. A track present in more than one
    /// input appears once.
    pub fn compose<'a>(streams: impl IntoIterator<Item = &'a MediaStream>) -> Self {
        let mut tracks: Vec<MediaTrack> = Vec::new();
        for stream in streams {
            for track in &stream.tracks {
                if !tracks.iter().any(|t| t.id == track.id) {
                    tracks.push(track.clone());
                }
            }
        }
        Self::new(tracks)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }

    /// True while at least one track is live.
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track.
    pub fn release(&self) {
        for track in &self.tracks {
            track.stop();
        }
        tracing::debug!(stream = %self.id, tracks = self.tracks.len(), "Stream released");
    }
}
