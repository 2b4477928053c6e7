//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClasscastError, ClasscastResult};

/// Container type every recording artifact is tagged with.
pub const DEFAULT_CONTAINER_MIME: &str = "video/webm";

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where finished recordings are written by the CLI.
    pub recordings_dir: PathBuf,

    /// Capture and encoder settings.
    pub capture: CaptureDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Capture parameters applied to every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Mime type tagged on every artifact, regardless of capture mode.
    pub container_mime: String,

    /// Target video frame rate.
    pub fps: u32,

    /// Audio sample rate.
    pub audio_sample_rate: u32,

    /// Target video bitrate in kbit/s.
    pub video_bitrate_kbps: u32,

    /// How long `stop` waits for the encoder to finalize.
    pub finalize_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "classcast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recordings_dir: dirs_default_recordings(),
            capture: CaptureDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            container_mime: DEFAULT_CONTAINER_MIME.to_string(),
            fps: 30,
            audio_sample_rate: 48000,
            video_bitrate_kbps: 2500,
            finalize_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CaptureDefaults {
    /// Upper bound on the wait for the encoder's finalization event.
    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_secs(self.finalize_timeout_secs)
    }

    /// Reject settings the encoder backends cannot work with.
    pub fn validate(&self) -> ClasscastResult<()> {
        if self.container_mime.trim().is_empty() {
            return Err(ClasscastError::config("container_mime must not be empty"));
        }
        if self.fps == 0 {
            return Err(ClasscastError::config("fps must be greater than zero"));
        }
        if self.audio_sample_rate == 0 {
            return Err(ClasscastError::config(
                "audio_sample_rate must be greater than zero",
            ));
        }
        if self.finalize_timeout_secs == 0 {
            return Err(ClasscastError::config(
                "finalize_timeout_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate a config file at an explicit path.
    pub fn load_from(path: &Path) -> ClasscastResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.capture.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("classcast").join("config.json")
}

/// Default recordings directory.
fn dirs_default_recordings() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("classcast").join("recordings")
}
