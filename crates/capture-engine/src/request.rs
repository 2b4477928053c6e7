//! Capture modes.

use std::fmt;
use std::str::FromStr;

use classcast_common::error::ClasscastError;
use classcast_platform_core::UserMediaConstraints;
use serde::{Deserialize, Serialize};

/// Which sources a session records. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureRequest {
    /// Display sharing, video only.
    Screen,
    /// Microphone only.
    Audio,
    /// Camera and microphone.
    Video,
    /// Display sharing plus camera and microphone, composed into one stream.
    ScreenAndVideo,
}

impl CaptureRequest {
    pub const ALL: [CaptureRequest; 4] = [
        CaptureRequest::Screen,
        CaptureRequest::Audio,
        CaptureRequest::Video,
        CaptureRequest::ScreenAndVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureRequest::Screen => "screen",
            CaptureRequest::Audio => "audio",
            CaptureRequest::Video => "video",
            CaptureRequest::ScreenAndVideo => "screen-and-video",
        }
    }

    /// Whether the mode needs a display-sharing stream.
    pub fn needs_display(&self) -> bool {
        matches!(self, CaptureRequest::Screen | CaptureRequest::ScreenAndVideo)
    }

    /// Camera/microphone constraints, if the mode opens user media at all.
    pub fn user_media(&self) -> Option<UserMediaConstraints> {
        match self {
            CaptureRequest::Screen => None,
            CaptureRequest::Audio => Some(UserMediaConstraints::AUDIO_ONLY),
            CaptureRequest::Video | CaptureRequest::ScreenAndVideo => {
                Some(UserMediaConstraints::CAMERA_AND_MIC)
            }
        }
    }
}

impl fmt::Display for CaptureRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureRequest {
    type Err = ClasscastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ClasscastError::invalid_mode(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_mode_name() {
        for mode in CaptureRequest::ALL {
            assert_eq!(mode.as_str().parse::<CaptureRequest>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_invalid_mode_error() {
        let err = "Screen".parse::<CaptureRequest>().unwrap_err();
        assert!(matches!(err, ClasscastError::InvalidMode { ref mode } if mode == "Screen"));
    }

    #[test]
    fn constraints_follow_mode() {
        assert!(CaptureRequest::Screen.user_media().is_none());
        assert!(CaptureRequest::ScreenAndVideo.needs_display());
        let audio = CaptureRequest::Audio.user_media().unwrap();
        assert!(audio.audio && !audio.video);
    }
}
