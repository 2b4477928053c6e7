//! Display server detection.

use serde::{Deserialize, Serialize};

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    Windows,
    MacOS,
    #[default]
    Unknown,
}

/// Detect the display server of the current session.
pub fn detect_display_server() -> DisplayServer {
    if cfg!(target_os = "windows") {
        return DisplayServer::Windows;
    }
    if cfg!(target_os = "macos") {
        return DisplayServer::MacOS;
    }
    display_server_from_env(
        std::env::var("WAYLAND_DISPLAY").ok().as_deref(),
        std::env::var("DISPLAY").ok().as_deref(),
    )
}

fn display_server_from_env(wayland: Option<&str>, x11: Option<&str>) -> DisplayServer {
    match (wayland, x11) {
        (Some(w), _) if !w.is_empty() => DisplayServer::Wayland,
        (_, Some(x)) if !x.is_empty() => DisplayServer::X11,
        _ => DisplayServer::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wayland_wins_over_xwayland_display() {
        assert_eq!(
            display_server_from_env(Some("wayland-0"), Some(":0")),
            DisplayServer::Wayland
        );
        assert_eq!(display_server_from_env(None, Some(":1")), DisplayServer::X11);
        assert_eq!(display_server_from_env(Some(""), None), DisplayServer::Unknown);
    }
}
