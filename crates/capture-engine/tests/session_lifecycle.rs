use std::sync::Arc;
use std::time::Duration;

use classcast_capture_engine::synthetic::{DeviceFailure, SyntheticDevices, SyntheticEncoderFactory};
use classcast_capture_engine::{CaptureRequest, CaptureSessionManager, SessionState};
use classcast_common::config::{CaptureDefaults, DEFAULT_CONTAINER_MIME};
use classcast_common::error::ClasscastError;
use classcast_platform_core::{TrackKind, TrackSource};

fn manager_with(
    devices: &Arc<SyntheticDevices>,
    encoders: &Arc<SyntheticEncoderFactory>,
) -> CaptureSessionManager {
    CaptureSessionManager::new(devices.clone(), encoders.clone(), CaptureDefaults::default())
}

fn silent_encoders() -> Arc<SyntheticEncoderFactory> {
    Arc::new(SyntheticEncoderFactory::new().with_tail(Vec::new()))
}

#[tokio::test]
async fn each_mode_exposes_matching_tracks() {
    let expected: [(CaptureRequest, &[(TrackKind, TrackSource)]); 4] = [
        (
            CaptureRequest::Screen,
            &[(TrackKind::Video, TrackSource::Display)],
        ),
        (
            CaptureRequest::Audio,
            &[(TrackKind::Audio, TrackSource::Microphone)],
        ),
        (
            CaptureRequest::Video,
            &[
                (TrackKind::Video, TrackSource::Camera),
                (TrackKind::Audio, TrackSource::Microphone),
            ],
        ),
        (
            CaptureRequest::ScreenAndVideo,
            &[
                (TrackKind::Video, TrackSource::Display),
                (TrackKind::Video, TrackSource::Camera),
                (TrackKind::Audio, TrackSource::Microphone),
            ],
        ),
    ];

    for (mode, tracks) in expected {
        let devices = Arc::new(SyntheticDevices::new());
        let encoders = silent_encoders();
        let mut manager = manager_with(&devices, &encoders);

        manager.start(mode).await.unwrap();
        assert_eq!(manager.state(), SessionState::Recording);
        assert_eq!(manager.request(), Some(mode));

        let stream = manager.stream().expect("live stream while recording");
        let actual: Vec<_> = stream
            .tracks()
            .iter()
            .map(|t| (t.kind(), t.source()))
            .collect();
        assert_eq!(actual, tracks, "track set for {mode}");
        assert_eq!(
            encoders.last_encoder().unwrap().stream().id(),
            stream.id(),
            "encoder bound to the composed stream"
        );

        manager.stop().await.unwrap();
    }
}

#[tokio::test]
async fn stop_while_idle_returns_none() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    assert!(manager.stop().await.is_none());
    assert!(manager.stop().await.is_none());
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(encoders.created(), 0);
}

#[tokio::test]
async fn pause_and_resume_keep_buffered_chunks() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Video).await.unwrap();
    let encoder = encoders.last_encoder().unwrap();
    assert!(encoder.emit(b"one-".to_vec()));
    assert!(encoder.emit(b"two-".to_vec()));

    manager.pause();
    assert!(manager.is_paused());
    assert!(manager.is_recording());
    assert!(!encoder.emit(b"lost".to_vec()));

    manager.resume();
    assert_eq!(manager.state(), SessionState::Recording);
    assert!(encoder.emit(b"three".to_vec()));

    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.bytes(), b"one-two-three");
    assert_eq!(artifact.chunk_count(), 3);
    assert!(artifact.is_complete());
}

#[tokio::test]
async fn pause_and_resume_outside_their_states_are_ignored() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.pause();
    manager.resume();
    assert_eq!(manager.state(), SessionState::Idle);

    manager.start(CaptureRequest::Screen).await.unwrap();
    manager.resume();
    assert_eq!(manager.state(), SessionState::Recording);

    manager.pause();
    manager.pause();
    assert_eq!(manager.state(), SessionState::Paused);

    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.mode(), CaptureRequest::Screen);
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn buffered_counters_follow_the_active_session() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);
    assert_eq!(manager.buffered_bytes(), 0);

    manager.start(CaptureRequest::Audio).await.unwrap();
    let encoder = encoders.last_encoder().unwrap();
    encoder.emit(b"abc".to_vec());
    encoder.emit(Vec::new());
    encoder.emit(b"de".to_vec());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(manager.buffered_chunks(), 2);
    assert_eq!(manager.buffered_bytes(), 5);

    manager.pause();
    assert_eq!(manager.state(), SessionState::Paused);
    assert_eq!(manager.buffered_bytes(), 5);

    manager.stop().await.unwrap();
    assert_eq!(manager.buffered_chunks(), 0);
    assert_eq!(manager.buffered_bytes(), 0);
}

#[tokio::test]
async fn zero_length_chunks_are_not_buffered() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Audio).await.unwrap();
    let encoder = encoders.last_encoder().unwrap();
    encoder.emit(Vec::new());
    encoder.emit(b"x".to_vec());
    encoder.emit(Vec::new());

    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.bytes(), b"x");
    assert_eq!(artifact.chunk_count(), 1);
}

#[tokio::test]
async fn stop_releases_every_track_and_allows_a_fresh_start() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::ScreenAndVideo).await.unwrap();
    assert_eq!(devices.live_tracks(), 3);
    let first_stream = manager.stream().unwrap().clone();

    manager.stop().await.unwrap();
    assert_eq!(devices.live_tracks(), 0);
    assert!(!first_stream.is_active());
    assert!(manager.stream().is_none());

    manager.start(CaptureRequest::ScreenAndVideo).await.unwrap();
    assert_eq!(devices.live_tracks(), 3);
    assert_eq!(devices.acquisitions(), 4);
    assert!(manager.stream().unwrap().is_active());

    manager.stop().await.unwrap();
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn audio_session_end_to_end() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = Arc::new(SyntheticEncoderFactory::new());
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Audio).await.unwrap();
    manager.pause();
    manager.resume();
    let artifact = manager.stop().await.expect("artifact");

    assert!(artifact.size() > 0);
    assert_eq!(artifact.mime_type(), DEFAULT_CONTAINER_MIME);
    assert!(!manager.is_recording());
    assert!(!manager.is_paused());
}

#[tokio::test]
async fn invalid_mode_fails_before_acquisition() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    let err = manager.start_mode("invalid-mode").await.unwrap_err();
    assert!(matches!(err, ClasscastError::InvalidMode { .. }));
    assert!(!manager.is_recording());
    assert!(manager.stream().is_none());
    assert_eq!(devices.acquisitions(), 0);
    assert_eq!(encoders.created(), 0);
}

#[tokio::test]
async fn start_mode_accepts_known_names() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start_mode("screen-and-video").await.unwrap();
    assert_eq!(manager.request(), Some(CaptureRequest::ScreenAndVideo));
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn denied_permission_leaves_manager_idle() {
    let devices = Arc::new(SyntheticDevices::new().fail_display(DeviceFailure::PermissionDenied));
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    let err = manager.start(CaptureRequest::Screen).await.unwrap_err();
    assert!(matches!(err, ClasscastError::PermissionDenied { .. }));
    assert!(err.is_acquisition());
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(encoders.created(), 0);
}

#[tokio::test]
async fn failed_half_of_composite_releases_the_other_half() {
    let devices = Arc::new(SyntheticDevices::new().fail_camera(DeviceFailure::NotFound));
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    let err = manager
        .start(CaptureRequest::ScreenAndVideo)
        .await
        .unwrap_err();
    assert!(matches!(err, ClasscastError::DeviceNotFound { .. }));
    assert_eq!(devices.acquisitions(), 1);
    assert_eq!(devices.issued_tracks().len(), 1);
    assert_eq!(devices.live_tracks(), 0);
    assert!(!manager.is_recording());
}

#[tokio::test]
async fn second_start_replaces_and_releases_the_first_session() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Screen).await.unwrap();
    let first = manager.stream().unwrap().clone();
    encoders.last_encoder().unwrap().emit(b"old".to_vec());

    manager.start(CaptureRequest::Audio).await.unwrap();
    assert!(!first.is_active());
    assert_eq!(devices.live_tracks(), 1);
    assert_eq!(encoders.created(), 2);
    assert_eq!(manager.request(), Some(CaptureRequest::Audio));

    encoders.last_encoder().unwrap().emit(b"new".to_vec());
    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.bytes(), b"new");
    assert_eq!(artifact.mode(), CaptureRequest::Audio);
}

#[tokio::test]
async fn failed_replacement_keeps_the_running_session() {
    let devices =
        Arc::new(SyntheticDevices::new().fail_microphone(DeviceFailure::Dismissed));
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Screen).await.unwrap();
    let err = manager.start(CaptureRequest::Audio).await.unwrap_err();
    assert!(matches!(err, ClasscastError::Acquisition { .. }));

    assert_eq!(manager.state(), SessionState::Recording);
    assert_eq!(manager.request(), Some(CaptureRequest::Screen));
    assert!(manager.stream().unwrap().is_active());
    assert_eq!(encoders.created(), 1);
}

#[tokio::test]
async fn replacement_whose_encoder_fails_to_start_keeps_the_running_session() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Screen).await.unwrap();
    let first = encoders.last_encoder().unwrap();
    assert!(first.emit(b"lecture".to_vec()));

    encoders.set_failing_start(true);
    let err = manager.start(CaptureRequest::Audio).await.unwrap_err();
    assert!(matches!(err, ClasscastError::Encoder { .. }));
    assert_eq!(encoders.created(), 2);

    assert_eq!(manager.state(), SessionState::Recording);
    assert_eq!(manager.request(), Some(CaptureRequest::Screen));
    assert!(manager.stream().unwrap().is_active());
    assert_eq!(devices.live_tracks(), 1);

    assert!(first.emit(b"-continued".to_vec()));
    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.bytes(), b"lecture-continued");
    assert_eq!(artifact.mode(), CaptureRequest::Screen);
    assert!(artifact.is_complete());
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn cancel_during_pending_start_releases_acquired_streams() {
    let devices = Arc::new(SyntheticDevices::new().with_latency(Duration::from_millis(100)));
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);
    let cancel = manager.cancel_handle();

    let pending = tokio::spawn(async move {
        let result = manager.start(CaptureRequest::Video).await;
        (manager, result)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let (mut manager, result) = pending.await.unwrap();
    assert!(matches!(result, Err(ClasscastError::Cancelled)));
    assert_eq!(devices.acquisitions(), 1);
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(encoders.created(), 0);
    assert!(manager.stop().await.is_none());
}

#[tokio::test]
async fn cancel_reaches_a_start_that_has_not_run_yet() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);
    let cancel = manager.cancel_handle();

    let pending = tokio::spawn(async move {
        let result = manager.start(CaptureRequest::Audio).await;
        (manager, result)
    });
    cancel.cancel();

    let (manager, result) = pending.await.unwrap();
    assert!(matches!(result, Err(ClasscastError::Cancelled)));
    assert!(!manager.is_recording());
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(encoders.created(), 0);
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn cancel_applies_to_a_single_start_attempt() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.cancel_handle().cancel();
    let err = manager.start(CaptureRequest::Audio).await.unwrap_err();
    assert!(matches!(err, ClasscastError::Cancelled));
    assert_eq!(devices.live_tracks(), 0);

    manager.start(CaptureRequest::Audio).await.unwrap();
    assert!(manager.is_recording());
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn encoder_failure_mid_recording_yields_incomplete_artifact() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Video).await.unwrap();
    let encoder = encoders.last_encoder().unwrap();
    assert!(encoder.emit(b"before-unplug".to_vec()));
    assert!(encoder.fail("camera disconnected"));

    let artifact = manager.stop().await.unwrap();
    assert_eq!(artifact.bytes(), b"before-unplug");
    assert!(!artifact.is_complete());
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn encoder_creation_failure_releases_streams() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = Arc::new(SyntheticEncoderFactory::new().failing_create());
    let mut manager = manager_with(&devices, &encoders);

    let err = manager.start(CaptureRequest::Video).await.unwrap_err();
    assert!(matches!(err, ClasscastError::Encoder { .. }));
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn encoder_start_failure_releases_streams() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = Arc::new(SyntheticEncoderFactory::new().failing_start());
    let mut manager = manager_with(&devices, &encoders);

    assert!(manager.start(CaptureRequest::Screen).await.is_err());
    assert_eq!(devices.live_tracks(), 0);
    assert!(manager.stream().is_none());
}

#[tokio::test]
async fn finalize_timeout_keeps_what_was_buffered() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = Arc::new(
        SyntheticEncoderFactory::new()
            .with_tail(b"-tail".to_vec())
            .withholding_finish(),
    );
    let config = CaptureDefaults {
        finalize_timeout_secs: 1,
        ..CaptureDefaults::default()
    };
    let mut manager = CaptureSessionManager::new(devices.clone(), encoders.clone(), config);

    manager.start(CaptureRequest::Audio).await.unwrap();
    encoders.last_encoder().unwrap().emit(b"body".to_vec());

    let artifact = manager.stop().await.unwrap();
    assert!(!artifact.is_complete());
    assert_eq!(artifact.bytes(), b"body-tail");
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn periodic_encoder_output_reaches_the_artifact() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = Arc::new(
        SyntheticEncoderFactory::new()
            .with_tail(Vec::new())
            .with_periodic_output(Duration::from_millis(10), 16),
    );
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Screen).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(manager.buffered_chunks() > 0);

    let artifact = manager.stop().await.unwrap();
    assert!(artifact.size() >= 16);
    assert_eq!(artifact.size() % 16, 0);
    assert_eq!(artifact.size(), artifact.chunk_count() * 16);
}

#[tokio::test]
async fn dropping_the_manager_releases_the_active_session() {
    let devices = Arc::new(SyntheticDevices::new());
    let encoders = silent_encoders();
    let mut manager = manager_with(&devices, &encoders);

    manager.start(CaptureRequest::Video).await.unwrap();
    assert_eq!(devices.live_tracks(), 2);
    drop(manager);
    assert_eq!(devices.live_tracks(), 0);
}
