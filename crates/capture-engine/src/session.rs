//! Recording session management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use classcast_common::clock::RecordingClock;
use classcast_common::config::CaptureDefaults;
use classcast_common::error::{ClasscastError, ClasscastResult};
use classcast_platform_core::{MediaDevices, MediaStream, UserMediaConstraints};
use tokio::task::JoinHandle;

use crate::encoder::{EncoderEvents, EncoderFactory, MediaEncoder};
use crate::recorder::{collect_chunks, ChunkBuffer, CollectorExit, RecordingArtifact};
use crate::request::CaptureRequest;

/// State of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session is active.
    #[default]
    Idle,
    /// Recording in progress.
    Recording,
    /// Recording paused; streams and buffered chunks are kept.
    Paused,
}

/// Requests cancellation of a `start` that is still acquiring streams.
///
/// Obtain it with [`CaptureSessionManager::cancel_handle`]. A cancel is
/// latched until the next `start` attempt settles, so it also reaches a
/// start that was scheduled but has not run yet. The cancelled `start`
/// releases whatever it acquired as soon as the acquisition settles and
/// returns [`ClasscastError::Cancelled`]. Once that attempt settles the
/// latch is cleared and later starts are unaffected.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Streams obtained for one start attempt.
struct Acquired {
    /// Each stream as handed out by the host, released individually.
    sources: Vec<MediaStream>,
    /// The logical stream the encoder is bound to.
    stream: MediaStream,
}

impl Acquired {
    fn single(stream: MediaStream) -> Self {
        Self {
            sources: vec![stream.clone()],
            stream,
        }
    }

    fn composite(sources: Vec<MediaStream>) -> Self {
        let stream = MediaStream::compose(&sources);
        Self { sources, stream }
    }

    fn release(&self) {
        for source in &self.sources {
            source.release();
        }
        self.stream.release();
    }
}

/// Everything owned by one active recording.
struct ActiveSession {
    request: CaptureRequest,
    streams: Acquired,
    encoder: Box<dyn MediaEncoder>,
    buffer: ChunkBuffer,
    collector: JoinHandle<CollectorExit>,
    clock: RecordingClock,
    state: SessionState,
}

/// Drives one capture session at a time: acquisition, encoder lifecycle,
/// chunk buffering, and artifact production.
pub struct CaptureSessionManager {
    devices: Arc<dyn MediaDevices>,
    encoders: Arc<dyn EncoderFactory>,
    config: CaptureDefaults,
    active: Option<ActiveSession>,
    cancel: CancelHandle,
}

impl CaptureSessionManager {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        encoders: Arc<dyn EncoderFactory>,
        config: CaptureDefaults,
    ) -> Self {
        Self {
            devices,
            encoders,
            config,
            active: None,
            cancel: CancelHandle::default(),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.active.as_ref().map_or(SessionState::Idle, |s| s.state)
    }

    /// True while a session is active, including while paused.
    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    /// Mode of the active session.
    pub fn request(&self) -> Option<CaptureRequest> {
        self.active.as_ref().map(|s| s.request)
    }

    /// The live composed stream, for preview rendering.
    pub fn stream(&self) -> Option<&MediaStream> {
        self.active.as_ref().map(|s| &s.streams.stream)
    }

    /// Number of chunks buffered so far in the active session.
    pub fn buffered_chunks(&self) -> usize {
        self.active.as_ref().map_or(0, |s| s.buffer.len())
    }

    pub fn buffered_bytes(&self) -> u64 {
        self.active.as_ref().map_or(0, |s| s.buffer.total_bytes())
    }

    /// Active recording time so far, pauses excluded.
    pub fn elapsed_secs(&self) -> f64 {
        self.active
            .as_ref()
            .map_or(0.0, |s| s.clock.elapsed_secs())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CaptureDefaults {
        &self.config
    }

    /// Parse a mode name and start recording.
    ///
    /// An unknown name fails with `InvalidMode` before anything is acquired.
    pub async fn start_mode(&mut self, mode: &str) -> ClasscastResult<()> {
        let request = match mode.parse::<CaptureRequest>() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(mode, error = %e, "Rejected capture mode");
                return Err(e);
            }
        };
        self.start(request).await
    }

    /// Start recording.
    ///
    /// On failure the manager is left exactly as it was: nothing acquired
    /// during the attempt is retained and an active session keeps running.
    /// An active session is replaced only once the new encoder is running;
    /// its tracks are then released and its recording is discarded.
    pub async fn start(&mut self, request: CaptureRequest) -> ClasscastResult<()> {
        let result = self.start_attempt(request).await;
        self.cancel.clear();
        result
    }

    async fn start_attempt(&mut self, request: CaptureRequest) -> ClasscastResult<()> {
        tracing::info!(mode = %request, "Starting capture session");

        let acquired = match self.acquire(request).await {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!(mode = %request, error = %e, "Stream acquisition failed");
                return Err(e);
            }
        };

        if self.cancel.is_cancelled() {
            acquired.release();
            tracing::info!(mode = %request, "Capture start cancelled; released acquired streams");
            return Err(ClasscastError::Cancelled);
        }

        let (events, rx) = EncoderEvents::channel();
        let mut encoder = match self.encoders.create(&acquired.stream, events) {
            Ok(encoder) => encoder,
            Err(e) => {
                acquired.release();
                tracing::warn!(mode = %request, error = %e, "Failed to create encoder");
                return Err(e);
            }
        };

        let buffer = ChunkBuffer::new();
        let collector = tokio::spawn(collect_chunks(rx, buffer.clone()));

        if let Err(e) = encoder.start() {
            collector.abort();
            acquired.release();
            tracing::warn!(mode = %request, error = %e, "Failed to start encoder");
            return Err(e);
        }
        let clock = RecordingClock::start();

        if let Some(previous) = self.active.take() {
            let mode = previous.request;
            let discarded = self.finalize(previous).await;
            tracing::warn!(
                previous_mode = %mode,
                discarded_bytes = discarded.size(),
                "Replaced active capture session; previous recording discarded"
            );
        }

        tracing::info!(
            mode = %request,
            stream = %acquired.stream.id(),
            tracks = acquired.stream.tracks().len(),
            epoch_wall = %clock.epoch_wall().to_rfc3339(),
            "Capture session started"
        );

        self.active = Some(ActiveSession {
            request,
            streams: acquired,
            encoder,
            buffer,
            collector,
            clock,
            state: SessionState::Recording,
        });
        Ok(())
    }

    /// Pause a running recording. No-op unless recording.
    pub fn pause(&mut self) {
        let Some(session) = self.active.as_mut() else {
            tracing::debug!("Pause ignored: no active session");
            return;
        };
        if session.state != SessionState::Recording {
            tracing::debug!(state = ?session.state, "Pause ignored");
            return;
        }
        if let Err(e) = session.encoder.pause() {
            tracing::warn!(error = %e, "Encoder failed to pause");
            return;
        }
        session.clock.pause();
        session.state = SessionState::Paused;
        tracing::info!("Recording paused");
    }

    /// Resume a paused recording. No-op unless paused.
    pub fn resume(&mut self) {
        let Some(session) = self.active.as_mut() else {
            tracing::debug!("Resume ignored: no active session");
            return;
        };
        if session.state != SessionState::Paused {
            tracing::debug!(state = ?session.state, "Resume ignored");
            return;
        }
        if let Err(e) = session.encoder.resume() {
            tracing::warn!(error = %e, "Encoder failed to resume");
            return;
        }
        session.clock.resume();
        session.state = SessionState::Recording;
        tracing::info!("Recording resumed");
    }

    /// Stop recording and produce the artifact.
    ///
    /// Returns `None` without side effects when no session is active.
    pub async fn stop(&mut self) -> Option<RecordingArtifact> {
        let Some(session) = self.active.take() else {
            tracing::debug!("Stop ignored: no active session");
            return None;
        };
        Some(self.finalize(session).await)
    }

    async fn acquire(&self, request: CaptureRequest) -> ClasscastResult<Acquired> {
        let acquired = match request {
            CaptureRequest::Screen => Acquired::single(self.devices.get_display_media().await?),
            CaptureRequest::Audio => Acquired::single(
                self.devices
                    .get_user_media(UserMediaConstraints::AUDIO_ONLY)
                    .await?,
            ),
            CaptureRequest::Video => Acquired::single(
                self.devices
                    .get_user_media(UserMediaConstraints::CAMERA_AND_MIC)
                    .await?,
            ),
            CaptureRequest::ScreenAndVideo => {
                let (display, camera) = tokio::join!(
                    self.devices.get_display_media(),
                    self.devices
                        .get_user_media(UserMediaConstraints::CAMERA_AND_MIC)
                );
                match (display, camera) {
                    (Ok(display), Ok(camera)) => Acquired::composite(vec![display, camera]),
                    (Ok(acquired), Err(e)) | (Err(e), Ok(acquired)) => {
                        acquired.release();
                        return Err(e);
                    }
                    (Err(e), Err(other)) => {
                        tracing::debug!(error = %other, "Second acquisition also failed");
                        return Err(e);
                    }
                }
            }
        };

        if acquired.stream.tracks().is_empty() {
            acquired.release();
            return Err(ClasscastError::acquisition(format!(
                "host returned no tracks for {request} capture"
            )));
        }
        Ok(acquired)
    }

    /// Finalize the encoder, release every track, and assemble the artifact.
    async fn finalize(&self, mut session: ActiveSession) -> RecordingArtifact {
        tracing::info!(mode = %session.request, "Stopping capture session");
        session.clock.pause();

        let stop_result = session.encoder.stop();
        session.streams.release();

        let complete = match stop_result {
            Ok(()) => {
                let timeout = self.config.finalize_timeout();
                match tokio::time::timeout(timeout, &mut session.collector).await {
                    Ok(Ok(CollectorExit::Finished)) => true,
                    Ok(Ok(CollectorExit::Failed)) => false,
                    Ok(Ok(CollectorExit::Disconnected)) => {
                        tracing::warn!("Encoder went away without finalizing");
                        false
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Chunk collector task failed");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = timeout.as_secs(),
                            "Encoder finalization timed out; keeping buffered chunks"
                        );
                        session.collector.abort();
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Encoder failed to stop; keeping buffered chunks");
                session.collector.abort();
                false
            }
        };

        let discarded_empty = session.buffer.discarded_empty();
        let chunks = session.buffer.take();
        let artifact = RecordingArtifact::assemble(
            chunks,
            self.config.container_mime.clone(),
            session.request,
            session.clock.epoch_wall(),
            session.clock.elapsed(),
            complete,
        );

        tracing::info!(
            mode = %session.request,
            chunks = artifact.chunk_count(),
            discarded_empty,
            bytes = artifact.size(),
            duration_secs = artifact.duration().as_secs_f64(),
            complete,
            "Recording stopped"
        );
        artifact
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        if let Some(mut session) = self.active.take() {
            tracing::warn!(mode = %session.request, "Dropping active capture session");
            if let Err(e) = session.encoder.stop() {
                tracing::debug!(error = %e, "Encoder stop during drop failed");
            }
            session.streams.release();
            session.collector.abort();
        }
    }
}
