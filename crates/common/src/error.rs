//! Error types shared across ClassCast crates.

/// Top-level error type for ClassCast operations.
#[derive(Debug, thiserror::Error)]
pub enum ClasscastError {
    #[error("Stream acquisition failed: {message}")]
    Acquisition { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("No matching device: {message}")]
    DeviceNotFound { message: String },

    #[error("Invalid capture mode: {mode:?}")]
    InvalidMode { mode: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Capture start was cancelled")]
    Cancelled,

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClasscastError.
pub type ClasscastResult<T> = Result<T, ClasscastError>;

impl ClasscastError {
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition {
            message: msg.into(),
        }
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    pub fn device_not_found(msg: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            message: msg.into(),
        }
    }

    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidMode { mode: mode.into() }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error came from acquiring a media stream from the host
    /// (denied permission, missing device, user cancellation, no backend).
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Self::Acquisition { .. }
                | Self::PermissionDenied { .. }
                | Self::DeviceNotFound { .. }
                | Self::Unsupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_family_is_classified() {
        assert!(ClasscastError::permission_denied("camera").is_acquisition());
        assert!(ClasscastError::device_not_found("mic").is_acquisition());
        assert!(!ClasscastError::invalid_mode("hologram").is_acquisition());
        assert!(!ClasscastError::Cancelled.is_acquisition());
    }

    #[test]
    fn invalid_mode_message_quotes_the_mode() {
        let err = ClasscastError::invalid_mode("hologram");
        assert_eq!(err.to_string(), "Invalid capture mode: \"hologram\"");
    }
}
