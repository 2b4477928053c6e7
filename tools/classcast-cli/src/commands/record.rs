//! Record a clip.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use classcast_capture_engine::pipeline::{GstEncoderFactory, GstMediaDevices};
use classcast_capture_engine::synthetic::{SyntheticDevices, SyntheticEncoderFactory};
use classcast_capture_engine::{
    CaptureRequest, CaptureSessionManager, EncoderFactory, RecordingArtifact,
};
use classcast_common::config::AppConfig;
use classcast_platform_core::MediaDevices;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

pub async fn run(
    config: AppConfig,
    mode: String,
    output: Option<PathBuf>,
    duration: Option<u64>,
    synthetic: bool,
) -> anyhow::Result<()> {
    let request: CaptureRequest = mode.parse()?;
    config.capture.validate()?;

    let (devices, encoders): (Arc<dyn MediaDevices>, Arc<dyn EncoderFactory>) = if synthetic {
        (
            Arc::new(SyntheticDevices::new()),
            Arc::new(SyntheticEncoderFactory::new().with_periodic_output(
                Duration::from_millis(250),
                4096,
            )),
        )
    } else {
        (
            Arc::new(GstMediaDevices::new()),
            Arc::new(GstEncoderFactory::from_config(&config.capture)),
        )
    };

    println!("Starting {request} recording");
    println!("  Container: {}", config.capture.container_mime);
    println!("  FPS: {}", config.capture.fps);
    if synthetic {
        println!("  Backend: synthetic");
    }
    println!();

    let mut manager = CaptureSessionManager::new(devices, encoders, config.capture.clone());
    manager
        .start(request)
        .await
        .with_context(|| format!("Failed to start {request} recording"))?;

    if let Some(stream) = manager.stream() {
        for track in stream.tracks() {
            println!("  [{:?}] {} ({:?})", track.kind(), track.label(), track.source());
        }
    }
    println!();
    println!("Type p + Enter to pause, r to resume, s to stop (Ctrl+C also stops)");

    wait_for_stop(&mut manager, duration).await?;
    print_progress(&manager);

    let artifact = manager
        .stop()
        .await
        .context("Recording session ended unexpectedly")?;
    let path = output.unwrap_or_else(|| default_output_path(&config, &artifact));
    artifact.write_to(&path)?;

    println!();
    println!("Recording saved to: {}", path.display());
    println!(
        "  {} bytes, {} chunks, {:.1}s{}",
        artifact.size(),
        artifact.chunk_count(),
        artifact.duration().as_secs_f64(),
        if artifact.is_complete() {
            ""
        } else {
            " (encoder did not finalize; file may be truncated)"
        }
    );

    Ok(())
}

async fn wait_for_stop(
    manager: &mut CaptureSessionManager,
    duration: Option<u64>,
) -> anyhow::Result<()> {
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                return Ok(());
            }
            _ = wait_until(deadline) => return Ok(()),
            line = lines.next_line(), if stdin_open => {
                match line?.as_deref().map(str::trim) {
                    Some("p") => {
                        manager.pause();
                        print_progress(manager);
                    }
                    Some("r") => {
                        manager.resume();
                        print_progress(manager);
                    }
                    Some("s") | Some("q") => return Ok(()),
                    Some("") => {}
                    Some(other) => println!("Unknown command: {other}"),
                    None => stdin_open = false,
                }
            }
        }
    }
}

fn print_progress(manager: &CaptureSessionManager) {
    println!(
        "{:?}: {:.1}s, {} chunks, {} bytes buffered",
        manager.state(),
        manager.elapsed_secs(),
        manager.buffered_chunks(),
        manager.buffered_bytes()
    );
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn default_output_path(config: &AppConfig, artifact: &RecordingArtifact) -> PathBuf {
    config.recordings_dir.join(format!(
        "{}-{}.{}",
        artifact.mode(),
        artifact.started_at().format("%Y%m%d-%H%M%S"),
        artifact.extension()
    ))
}
