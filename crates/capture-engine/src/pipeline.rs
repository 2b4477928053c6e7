//! GStreamer capture backend.
//!
//! Tracks handed out by [`GstMediaDevices`] carry a GStreamer source
//! description as their device string. [`GstEncoderFactory`] turns the first
//! video and first audio track of a stream into one pipeline that encodes
//! VP8/Opus into a streamable WebM, and taps every muxed buffer off the sink
//! pad as an encoded chunk. EOS on the bus is reported as finalization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use classcast_common::config::CaptureDefaults;
use classcast_common::error::{ClasscastError, ClasscastResult};
use classcast_platform_core::{
    detect_display_server, DisplayServer, MediaDevices, MediaStream, MediaTrack, TrackKind,
    TrackSource, UserMediaConstraints,
};
use gst::prelude::*;
use gstreamer as gst;

use crate::encoder::{EncoderEvents, EncoderFactory, EncoderState, MediaEncoder};

/// Initialize GStreamer once per process.
pub fn init_gstreamer() -> ClasscastResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(ClasscastError::unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Whether a GStreamer element factory is installed.
pub fn element_available(name: &str) -> bool {
    init_gstreamer().is_ok() && gst::ElementFactory::find(name).is_some()
}

fn require_element(name: &str) -> ClasscastResult<()> {
    if element_available(name) {
        Ok(())
    } else {
        Err(ClasscastError::unsupported(format!(
            "GStreamer element '{name}' is not installed"
        )))
    }
}

/// A source element chosen for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceSpec {
    element: &'static str,
    launch: String,
}

impl SourceSpec {
    fn new(element: &'static str, properties: &str) -> Self {
        let launch = if properties.is_empty() {
            format!("{element} do-timestamp=true")
        } else {
            format!("{element} {properties} do-timestamp=true")
        };
        Self { element, launch }
    }

    fn into_track(self, kind: TrackKind, source: TrackSource, label: &str) -> MediaTrack {
        MediaTrack::new(kind, source, label).with_device(self.launch)
    }
}

fn display_source(display_server: DisplayServer) -> ClasscastResult<SourceSpec> {
    match display_server {
        DisplayServer::X11 => Ok(SourceSpec::new(
            "ximagesrc",
            "use-damage=false show-pointer=true",
        )),
        DisplayServer::Windows => Ok(SourceSpec::new("d3d11screencapturesrc", "show-cursor=true")),
        DisplayServer::MacOS => Ok(SourceSpec::new(
            "avfvideosrc",
            "capture-screen=true capture-screen-cursor=true",
        )),
        DisplayServer::Wayland => Err(ClasscastError::unsupported(
            "Wayland screen capture needs the desktop ScreenCast portal, which this backend does not negotiate",
        )),
        DisplayServer::Unknown => Err(ClasscastError::device_not_found(
            "no graphical session detected for display capture",
        )),
    }
}

fn microphone_source() -> SourceSpec {
    if cfg!(target_os = "windows") {
        SourceSpec::new("wasapisrc", "low-latency=true")
    } else if cfg!(target_os = "macos") {
        SourceSpec::new("osxaudiosrc", "")
    } else {
        SourceSpec::new("pulsesrc", "")
    }
}

async fn camera_source() -> ClasscastResult<SourceSpec> {
    if cfg!(target_os = "windows") {
        return Ok(SourceSpec::new("ksvideosrc", "device-index=0"));
    }
    if cfg!(target_os = "macos") {
        return Ok(SourceSpec::new("avfvideosrc", "device-index=0"));
    }
    let device = tokio::task::spawn_blocking(detect_default_webcam_device)
        .await
        .map_err(|e| ClasscastError::acquisition(format!("webcam probe failed: {e}")))?
        .ok_or_else(|| ClasscastError::device_not_found("no V4L2 camera under /dev/video*"))?;
    Ok(SourceSpec::new(
        "v4l2src",
        &format!("device=\"{}\"", escape_property(&device)),
    ))
}

/// Host devices backed by GStreamer source elements.
#[derive(Debug, Clone)]
pub struct GstMediaDevices {
    display_server: DisplayServer,
}

impl GstMediaDevices {
    pub fn new() -> Self {
        Self::with_display_server(detect_display_server())
    }

    pub fn with_display_server(display_server: DisplayServer) -> Self {
        Self { display_server }
    }

    pub fn display_server(&self) -> DisplayServer {
        self.display_server
    }
}

impl Default for GstMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaDevices for GstMediaDevices {
    async fn get_display_media(&self) -> ClasscastResult<MediaStream> {
        let spec = display_source(self.display_server)?;
        require_element(spec.element)?;
        tracing::info!(source = %spec.launch, "Acquired display source");
        Ok(MediaStream::new(vec![spec.into_track(
            TrackKind::Video,
            TrackSource::Display,
            "Screen",
        )]))
    }

    async fn get_user_media(
        &self,
        constraints: UserMediaConstraints,
    ) -> ClasscastResult<MediaStream> {
        if !constraints.video && !constraints.audio {
            return Err(ClasscastError::acquisition(
                "user media needs at least one of audio or video",
            ));
        }

        let mut tracks = Vec::new();
        if constraints.video {
            let spec = camera_source().await?;
            require_element(spec.element)?;
            tracing::info!(source = %spec.launch, "Acquired camera source");
            tracks.push(spec.into_track(TrackKind::Video, TrackSource::Camera, "Camera"));
        }
        if constraints.audio {
            let spec = microphone_source();
            require_element(spec.element)?;
            tracing::info!(source = %spec.launch, "Acquired microphone source");
            tracks.push(spec.into_track(TrackKind::Audio, TrackSource::Microphone, "Microphone"));
        }
        Ok(MediaStream::new(tracks))
    }
}

/// Encoding parameters for GStreamer pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GstEncoderSettings {
    pub fps: u32,
    pub audio_sample_rate: u32,
    pub video_bitrate_kbps: u32,
}

impl From<&CaptureDefaults> for GstEncoderSettings {
    fn from(config: &CaptureDefaults) -> Self {
        Self {
            fps: config.fps,
            audio_sample_rate: config.audio_sample_rate,
            video_bitrate_kbps: config.video_bitrate_kbps,
        }
    }
}

/// Builds WebM encoders over GStreamer source tracks.
#[derive(Debug, Clone)]
pub struct GstEncoderFactory {
    settings: GstEncoderSettings,
}

impl GstEncoderFactory {
    pub fn new(settings: GstEncoderSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &CaptureDefaults) -> Self {
        Self::new(config.into())
    }
}

impl EncoderFactory for GstEncoderFactory {
    fn create(
        &self,
        stream: &MediaStream,
        events: EncoderEvents,
    ) -> ClasscastResult<Box<dyn MediaEncoder>> {
        init_gstreamer()?;

        let video = first_live_source(stream, TrackKind::Video)?;
        let audio = first_live_source(stream, TrackKind::Audio)?;
        let ignored = stream.tracks().len()
            - usize::from(video.is_some())
            - usize::from(audio.is_some());
        if ignored > 0 {
            tracing::debug!(ignored, "Extra tracks are not muxed into the recording");
        }

        let launch = build_launch(video, audio, &self.settings)?;
        tracing::debug!(%launch, "Building encoder pipeline");
        Ok(Box::new(GstEncoder::from_launch(&launch, events)?))
    }
}

fn first_live_source(stream: &MediaStream, kind: TrackKind) -> ClasscastResult<Option<&str>> {
    let Some(track) = stream
        .tracks()
        .iter()
        .find(|t| t.kind() == kind && t.is_live())
    else {
        return Ok(None);
    };
    track.device().map(Some).ok_or_else(|| {
        ClasscastError::encoder(format!(
            "track {} has no GStreamer source description",
            track.id()
        ))
    })
}

fn build_launch(
    video: Option<&str>,
    audio: Option<&str>,
    settings: &GstEncoderSettings,
) -> ClasscastResult<String> {
    if video.is_none() && audio.is_none() {
        return Err(ClasscastError::encoder("stream has no live tracks to encode"));
    }

    let mut launch = String::from(
        "webmmux name=mux streamable=true ! fakesink name=chunks sync=false async=false",
    );

    if let Some(source) = video {
        let fps = settings.fps.max(1);
        // One keyframe every two seconds keeps chunks seekable.
        let keyint = fps.saturating_mul(2);
        let bitrate = settings.video_bitrate_kbps.saturating_mul(1000);
        launch.push_str(&format!(
            " {source} ! queue max-size-buffers=200 leaky=downstream ! videoconvert ! videorate ! video/x-raw,framerate={fps}/1 ! queue max-size-buffers=8 ! vp8enc deadline=1 target-bitrate={bitrate} keyframe-max-dist={keyint} ! queue ! mux."
        ));
    }

    if let Some(source) = audio {
        let rate = settings.audio_sample_rate;
        launch.push_str(&format!(
            " {source} ! queue ! audioconvert ! audioresample ! audio/x-raw,rate={rate},channels=2 ! opusenc ! queue ! mux."
        ));
    }

    Ok(launch)
}

/// A WebM encoding pipeline emitting its output as chunks.
pub struct GstEncoder {
    pipeline: gst::Pipeline,
    events: EncoderEvents,
    state: EncoderState,
    shutdown: Arc<AtomicBool>,
    bus_watch: Option<JoinHandle<()>>,
}

impl GstEncoder {
    fn from_launch(launch: &str, events: EncoderEvents) -> ClasscastResult<Self> {
        let element = gst::parse::launch(launch)
            .map_err(|e| ClasscastError::encoder(format!("Failed to build pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| ClasscastError::encoder("Launch string did not produce a pipeline"))?;

        let sink = pipeline
            .by_name("chunks")
            .ok_or_else(|| ClasscastError::encoder("pipeline has no chunk sink"))?;
        let pad = sink
            .static_pad("sink")
            .ok_or_else(|| ClasscastError::encoder("chunk sink has no sink pad"))?;

        let tap = events.clone();
        pad.add_probe(gst::PadProbeType::BUFFER, move |_pad, info| {
            if let Some(gst::PadProbeData::Buffer(ref buffer)) = info.data {
                match buffer.map_readable() {
                    Ok(map) => {
                        tap.chunk(map.as_slice().to_vec());
                    }
                    Err(_) => {
                        tap.error("unreadable buffer at chunk sink");
                    }
                }
            }
            gst::PadProbeReturn::Ok
        })
        .ok_or_else(|| ClasscastError::encoder("failed to attach chunk probe"))?;

        Ok(Self {
            pipeline,
            events,
            state: EncoderState::Inactive,
            shutdown: Arc::new(AtomicBool::new(false)),
            bus_watch: None,
        })
    }

    fn set_state(&self, state: gst::State, action: &str) -> ClasscastResult<()> {
        self.pipeline
            .set_state(state)
            .map(|_| ())
            .map_err(|e| ClasscastError::encoder(format!("Failed to {action} pipeline: {e:?}")))
    }
}

/// Forward EOS and errors from the bus until shutdown.
fn watch_bus(bus: gst::Bus, events: EncoderEvents, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(100),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) else {
            continue;
        };
        match msg.view() {
            gst::MessageView::Eos(_) => {
                tracing::debug!("EOS received; encoder drained");
                events.finished();
                return;
            }
            gst::MessageView::Error(e) => {
                tracing::warn!(error = %e.error(), "Encoder pipeline error");
                // Nothing else will flow once the pipeline has errored.
                events.failed(e.error().to_string());
                return;
            }
            _ => {}
        }
    }
}

impl MediaEncoder for GstEncoder {
    fn start(&mut self) -> ClasscastResult<()> {
        if self.state != EncoderState::Inactive {
            return Err(ClasscastError::encoder("encoder already started"));
        }
        self.set_state(gst::State::Playing, "start")?;

        match self.pipeline.state(gst::ClockTime::from_seconds(10)) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                tracing::warn!(?state, "Pipeline did not reach Playing state within timeout");
            }
            (Err(e), _, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                return Err(ClasscastError::encoder(format!(
                    "pipeline failed to reach Playing state: {e:?}"
                )));
            }
        }

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| ClasscastError::encoder("pipeline has no bus"))?;
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        self.bus_watch = Some(std::thread::spawn(move || watch_bus(bus, events, shutdown)));
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn pause(&mut self) -> ClasscastResult<()> {
        self.set_state(gst::State::Paused, "pause")?;
        self.state = EncoderState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> ClasscastResult<()> {
        self.set_state(gst::State::Playing, "resume")?;
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn stop(&mut self) -> ClasscastResult<()> {
        if self.state == EncoderState::Inactive {
            return Err(ClasscastError::encoder("encoder is not running"));
        }
        // Live sources only push EOS downstream while playing.
        if self.state == EncoderState::Paused {
            self.set_state(gst::State::Playing, "resume")?;
        }
        self.state = EncoderState::Inactive;

        if !self.pipeline.send_event(gst::event::Eos::new()) {
            tracing::warn!("Failed to send EOS event; output may be truncated");
            self.events.failed("pipeline did not accept EOS");
        }
        Ok(())
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.bus_watch.take() {
            let _ = handle.join();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::debug!(error = ?e, "Failed to tear down encoder pipeline");
        }
    }
}

/// Pick the most webcam-like V4L2 node among `/dev/video0`..`/dev/video15`.
fn detect_default_webcam_device() -> Option<String> {
    let mut best: Option<(String, u32)> = None;
    let mut first_existing: Option<String> = None;

    for idx in 0..16u32 {
        let dev_path = format!("/dev/video{idx}");
        if !std::path::Path::new(&dev_path).exists() {
            continue;
        }
        first_existing.get_or_insert_with(|| dev_path.clone());

        let name = std::fs::read_to_string(format!("/sys/class/video4linux/video{idx}/name"))
            .unwrap_or_default();
        let score = webcam_score(&name, probe_v4l2_capture(&dev_path));
        if score > best.as_ref().map_or(0, |(_, s)| *s) {
            best = Some((dev_path, score));
        }
    }

    match best {
        Some((device, score)) => {
            tracing::info!(%device, score, "Selected webcam device");
            Some(device)
        }
        None => first_existing,
    }
}

/// Score a device name as a webcam candidate; 0 rules it out.
fn webcam_score(name: &str, supports_capture: Option<bool>) -> u32 {
    const WEBCAM: [&str; 6] = ["webcam", "camera", "cam", "facetime", "logitech", "v4l2loopback"];
    const NOT_WEBCAM: [&str; 6] = ["tuner", "dvb", "hdmi", "capture", "encoder", "decoder"];

    let name = name.to_lowercase();
    if NOT_WEBCAM.iter().any(|kw| name.contains(kw)) {
        return 0;
    }
    let named = WEBCAM.iter().any(|kw| name.contains(kw));
    match (named, supports_capture) {
        (_, Some(false)) => 0,
        (true, Some(true)) => 100,
        (true, None) => 80,
        (false, Some(true)) => 50,
        (false, None) => 10,
    }
}

/// Ask `v4l2-ctl` whether a node reports Video Capture. `None` if the tool
/// is missing.
fn probe_v4l2_capture(dev_path: &str) -> Option<bool> {
    let output = std::process::Command::new("v4l2-ctl")
        .args(["--device", dev_path, "--info"])
        .output()
        .ok()?;
    if !output.status.success() {
        return Some(false);
    }
    Some(
        String::from_utf8_lossy(&output.stdout)
            .to_lowercase()
            .contains("video capture"),
    )
}

fn escape_property(value: &str) -> String {
    value.replace('"', "\\\"")
}
