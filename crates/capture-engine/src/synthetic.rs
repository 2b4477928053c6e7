//! In-memory capture backend.
//!
//! `SyntheticDevices` hands out tracks without touching hardware and can be
//! told to fail or stall each device class. `SyntheticEncoderFactory`
//! produces encoders whose output is driven either by the caller (through
//! [`SyntheticEncoderHandle::emit`]) or by a periodic timer. Used by the
//! test suites and by `classcast record --synthetic`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use classcast_common::error::{ClasscastError, ClasscastResult};
use classcast_platform_core::{
    MediaDevices, MediaStream, MediaTrack, TrackKind, TrackSource, UserMediaConstraints,
};

use crate::encoder::{EncoderEvents, EncoderFactory, EncoderState, MediaEncoder};

/// EBML magic, the first bytes of every WebM file.
pub const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// How a synthetic device refuses to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    PermissionDenied,
    NotFound,
    /// The user dismissed the picker.
    Dismissed,
}

impl DeviceFailure {
    fn into_error(self, device: &str) -> ClasscastError {
        match self {
            DeviceFailure::PermissionDenied => {
                ClasscastError::permission_denied(format!("{device} access was denied"))
            }
            DeviceFailure::NotFound => ClasscastError::device_not_found(format!("no {device}")),
            DeviceFailure::Dismissed => {
                ClasscastError::acquisition(format!("{device} selection was dismissed"))
            }
        }
    }
}

/// Fake host devices.
#[derive(Debug, Default)]
pub struct SyntheticDevices {
    display_failure: Option<DeviceFailure>,
    camera_failure: Option<DeviceFailure>,
    microphone_failure: Option<DeviceFailure>,
    latency: Duration,
    acquisitions: AtomicUsize,
    issued: Mutex<Vec<MediaTrack>>,
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every acquisition, as if a permission prompt were open.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_display(mut self, failure: DeviceFailure) -> Self {
        self.display_failure = Some(failure);
        self
    }

    pub fn fail_camera(mut self, failure: DeviceFailure) -> Self {
        self.camera_failure = Some(failure);
        self
    }

    pub fn fail_microphone(mut self, failure: DeviceFailure) -> Self {
        self.microphone_failure = Some(failure);
        self
    }

    /// Number of acquisition calls that handed out a stream.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Every track handed out so far.
    pub fn issued_tracks(&self) -> Vec<MediaTrack> {
        self.issued.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Tracks handed out and not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.issued_tracks().iter().filter(|t| t.is_live()).count()
    }

    fn hand_out(&self, tracks: Vec<MediaTrack>) -> MediaStream {
        if let Ok(mut issued) = self.issued.lock() {
            issued.extend(tracks.iter().cloned());
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        MediaStream::new(tracks)
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait::async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_display_media(&self) -> ClasscastResult<MediaStream> {
        self.wait().await;
        if let Some(failure) = self.display_failure {
            return Err(failure.into_error("display"));
        }
        Ok(self.hand_out(vec![MediaTrack::new(
            TrackKind::Video,
            TrackSource::Display,
            "Synthetic screen",
        )
        .with_device("synthetic:display")]))
    }

    async fn get_user_media(
        &self,
        constraints: UserMediaConstraints,
    ) -> ClasscastResult<MediaStream> {
        self.wait().await;
        if !constraints.video && !constraints.audio {
            return Err(ClasscastError::acquisition(
                "user media needs at least one of audio or video",
            ));
        }
        if constraints.video {
            if let Some(failure) = self.camera_failure {
                return Err(failure.into_error("camera"));
            }
        }
        if constraints.audio {
            if let Some(failure) = self.microphone_failure {
                return Err(failure.into_error("microphone"));
            }
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(
                MediaTrack::new(TrackKind::Video, TrackSource::Camera, "Synthetic camera")
                    .with_device("synthetic:camera"),
            );
        }
        if constraints.audio {
            tracks.push(
                MediaTrack::new(
                    TrackKind::Audio,
                    TrackSource::Microphone,
                    "Synthetic microphone",
                )
                .with_device("synthetic:microphone"),
            );
        }
        Ok(self.hand_out(tracks))
    }
}

/// Caller-side control over one synthetic encoder.
#[derive(Debug, Clone)]
pub struct SyntheticEncoderHandle {
    events: EncoderEvents,
    state: Arc<Mutex<EncoderState>>,
    stream: MediaStream,
}

impl SyntheticEncoderHandle {
    /// Emit a chunk if the encoder is recording. Returns whether it was sent.
    pub fn emit(&self, data: impl Into<Vec<u8>>) -> bool {
        if self.state() != EncoderState::Recording {
            return false;
        }
        self.events.chunk(data.into())
    }

    pub fn state(&self) -> EncoderState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(EncoderState::Inactive)
    }

    /// Report a fatal encoder error, as a pipeline that lost its device would.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.events.failed(message)
    }

    /// The stream the encoder was bound to.
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }
}

/// Builds synthetic encoders.
#[derive(Debug)]
pub struct SyntheticEncoderFactory {
    tail: Vec<u8>,
    interval: Option<Duration>,
    chunk_size: usize,
    fail_create: bool,
    fail_start: AtomicBool,
    withhold_finish: bool,
    created: Mutex<Vec<SyntheticEncoderHandle>>,
}

impl Default for SyntheticEncoderFactory {
    fn default() -> Self {
        Self {
            tail: WEBM_MAGIC.to_vec(),
            interval: None,
            chunk_size: 1024,
            fail_create: false,
            fail_start: AtomicBool::new(false),
            withhold_finish: false,
            created: Mutex::new(Vec::new()),
        }
    }
}

impl SyntheticEncoderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes flushed as the last chunk on stop. Empty means no flush data.
    pub fn with_tail(mut self, tail: impl Into<Vec<u8>>) -> Self {
        self.tail = tail.into();
        self
    }

    /// Emit a `chunk_size` chunk every `interval` while recording.
    pub fn with_periodic_output(mut self, interval: Duration, chunk_size: usize) -> Self {
        self.interval = Some(interval);
        self.chunk_size = chunk_size;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_start(self) -> Self {
        self.set_failing_start(true);
        self
    }

    /// Make encoders created from now on fail (or succeed) in `start`.
    pub fn set_failing_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Never report finalization, so `stop` has to time out.
    pub fn withholding_finish(mut self) -> Self {
        self.withhold_finish = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Handle for the most recently created encoder.
    pub fn last_encoder(&self) -> Option<SyntheticEncoderHandle> {
        self.created.lock().ok().and_then(|c| c.last().cloned())
    }
}

impl EncoderFactory for SyntheticEncoderFactory {
    fn create(
        &self,
        stream: &MediaStream,
        events: EncoderEvents,
    ) -> ClasscastResult<Box<dyn MediaEncoder>> {
        if self.fail_create {
            return Err(ClasscastError::encoder("synthetic encoder refused the stream"));
        }
        let handle = SyntheticEncoderHandle {
            events,
            state: Arc::new(Mutex::new(EncoderState::Inactive)),
            stream: stream.clone(),
        };
        if let Ok(mut created) = self.created.lock() {
            created.push(handle.clone());
        }
        Ok(Box::new(SyntheticEncoder {
            handle,
            tail: self.tail.clone(),
            interval: self.interval,
            chunk_size: self.chunk_size,
            fail_start: self.fail_start.load(Ordering::SeqCst),
            withhold_finish: self.withhold_finish,
            ticker: None,
        }))
    }
}

struct SyntheticEncoder {
    handle: SyntheticEncoderHandle,
    tail: Vec<u8>,
    interval: Option<Duration>,
    chunk_size: usize,
    fail_start: bool,
    withhold_finish: bool,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

impl SyntheticEncoder {
    fn set_state(&self, state: EncoderState) {
        if let Ok(mut current) = self.handle.state.lock() {
            *current = state;
        }
    }

    fn spawn_ticker(&self, interval: Duration) -> ClasscastResult<tokio::task::JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClasscastError::encoder(format!("no async runtime: {e}")))?;
        let handle = self.handle.clone();
        let chunk_size = self.chunk_size.max(1);
        Ok(runtime.spawn(async move {
            let mut sequence: u8 = 0;
            loop {
                tokio::time::sleep(interval).await;
                match handle.state() {
                    EncoderState::Inactive => break,
                    EncoderState::Paused => continue,
                    EncoderState::Recording => {
                        if !handle.emit(vec![sequence; chunk_size]) {
                            break;
                        }
                        sequence = sequence.wrapping_add(1);
                    }
                }
            }
        }))
    }
}

impl MediaEncoder for SyntheticEncoder {
    fn start(&mut self) -> ClasscastResult<()> {
        if self.fail_start {
            return Err(ClasscastError::encoder("synthetic encoder failed to start"));
        }
        if self.handle.state() != EncoderState::Inactive {
            return Err(ClasscastError::encoder("encoder already started"));
        }
        self.set_state(EncoderState::Recording);
        if let Some(interval) = self.interval {
            self.ticker = Some(self.spawn_ticker(interval)?);
        }
        Ok(())
    }

    fn pause(&mut self) -> ClasscastResult<()> {
        if self.handle.state() == EncoderState::Recording {
            self.set_state(EncoderState::Paused);
        }
        Ok(())
    }

    fn resume(&mut self) -> ClasscastResult<()> {
        if self.handle.state() == EncoderState::Paused {
            self.set_state(EncoderState::Recording);
        }
        Ok(())
    }

    fn stop(&mut self) -> ClasscastResult<()> {
        if self.handle.state() == EncoderState::Inactive {
            return Err(ClasscastError::encoder("encoder is not running"));
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.set_state(EncoderState::Inactive);
        self.handle.events.chunk(self.tail.clone());
        if !self.withhold_finish {
            self.handle.events.finished();
        }
        Ok(())
    }

    fn state(&self) -> EncoderState {
        self.handle.state()
    }
}

impl Drop for SyntheticEncoder {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_media_hands_out_requested_tracks() {
        let devices = SyntheticDevices::new();
        let stream = devices
            .get_user_media(UserMediaConstraints::CAMERA_AND_MIC)
            .await
            .unwrap();
        assert_eq!(stream.video_tracks().count(), 1);
        assert_eq!(stream.audio_tracks().count(), 1);
        assert_eq!(devices.live_tracks(), 2);

        stream.release();
        assert_eq!(devices.live_tracks(), 0);
    }

    #[tokio::test]
    async fn microphone_failure_maps_to_permission_denied() {
        let devices = SyntheticDevices::new().fail_microphone(DeviceFailure::PermissionDenied);
        let err = devices
            .get_user_media(UserMediaConstraints::AUDIO_ONLY)
            .await
            .unwrap_err();
        assert!(matches!(err, ClasscastError::PermissionDenied { .. }));
        assert_eq!(devices.acquisitions(), 0);
    }

    #[test]
    fn start_failure_applies_to_encoders_created_afterwards() {
        let factory = SyntheticEncoderFactory::new();
        let stream = MediaStream::new(Vec::new());

        let (events, _rx) = EncoderEvents::channel();
        let mut first = factory.create(&stream, events).unwrap();
        factory.set_failing_start(true);
        let (events, _rx2) = EncoderEvents::channel();
        let mut second = factory.create(&stream, events).unwrap();

        assert!(first.start().is_ok());
        assert!(second.start().is_err());
        assert_eq!(second.state(), EncoderState::Inactive);
    }

    #[test]
    fn paused_encoder_emits_nothing() {
        let factory = SyntheticEncoderFactory::new().with_tail(Vec::new());
        let (events, mut rx) = EncoderEvents::channel();
        let stream = MediaStream::new(Vec::new());
        let mut encoder = factory.create(&stream, events).unwrap();
        let handle = factory.last_encoder().unwrap();

        assert!(!handle.emit(b"early".to_vec()));
        encoder.start().unwrap();
        assert!(handle.emit(b"one".to_vec()));
        encoder.pause().unwrap();
        assert!(!handle.emit(b"held".to_vec()));
        encoder.resume().unwrap();
        assert!(handle.emit(b"two".to_vec()));
        encoder.stop().unwrap();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                crate::encoder::EncoderEvent::Chunk(b"one".to_vec()),
                crate::encoder::EncoderEvent::Chunk(b"two".to_vec()),
                crate::encoder::EncoderEvent::Chunk(Vec::new()),
                crate::encoder::EncoderEvent::Finished,
            ]
        );
    }
}
