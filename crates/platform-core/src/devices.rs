//! Media acquisition capability provided by the host environment.

use classcast_common::error::ClasscastResult;

use crate::stream::MediaStream;

/// Which user-media devices to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserMediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl UserMediaConstraints {
    pub const AUDIO_ONLY: Self = Self {
        video: false,
        audio: true,
    };

    pub const CAMERA_AND_MIC: Self = Self {
        video: true,
        audio: true,
    };
}

/// Asynchronous access to capture devices.
///
/// Both calls may take arbitrarily long (a permission prompt may be open)
/// and may fail with `PermissionDenied`, `DeviceNotFound`, `Acquisition`
/// (user cancelled) or `Unsupported`. A successful call hands exclusive
/// ownership of the returned tracks to the caller, who must release them.
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a video-only screen, window, or tab capture stream.
    async fn get_display_media(&self) -> ClasscastResult<MediaStream>;

    /// Acquire camera and/or microphone tracks.
    async fn get_user_media(
        &self,
        constraints: UserMediaConstraints,
    ) -> ClasscastResult<MediaStream>;
}
