//! Recording clock.
//!
//! Each capture session is anchored to a monotonic epoch taken when the
//! encoder starts. Paused intervals are excluded so the reported duration
//! matches the media that actually ended up in the artifact.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A recording clock that measures active (non-paused) time since start.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,

    /// Set while paused.
    paused_at: Option<Instant>,

    /// Sum of all completed pause intervals.
    paused_total: Duration,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    /// Freeze the active time. No-op if already paused.
    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    /// Continue accumulating active time. No-op if not paused.
    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Active recording time, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        let end = self.paused_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.epoch)
            .saturating_sub(self.paused_total)
    }

    /// Active recording time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> DateTime<Utc> {
        self.epoch_wall
    }
}
