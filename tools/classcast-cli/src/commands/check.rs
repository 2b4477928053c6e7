//! Check system capabilities.

use classcast_capture_engine::pipeline::{element_available, init_gstreamer};
use classcast_platform_core::{detect_display_server, DisplayServer};

/// A GStreamer element the recorder may need.
struct Requirement {
    element: &'static str,
    purpose: &'static str,
    required: bool,
}

fn requirements(display_server: DisplayServer) -> Vec<Requirement> {
    let mut list = vec![
        Requirement {
            element: "webmmux",
            purpose: "WebM container",
            required: true,
        },
        Requirement {
            element: "vp8enc",
            purpose: "video encoder",
            required: true,
        },
        Requirement {
            element: "opusenc",
            purpose: "audio encoder",
            required: true,
        },
    ];

    let (display, camera, mic) = match display_server {
        DisplayServer::Windows => ("d3d11screencapturesrc", "ksvideosrc", "wasapisrc"),
        DisplayServer::MacOS => ("avfvideosrc", "avfvideosrc", "osxaudiosrc"),
        _ => ("ximagesrc", "v4l2src", "pulsesrc"),
    };
    list.push(Requirement {
        element: display,
        purpose: "screen capture",
        required: false,
    });
    list.push(Requirement {
        element: camera,
        purpose: "camera capture",
        required: false,
    });
    list.push(Requirement {
        element: mic,
        purpose: "microphone capture",
        required: false,
    });
    list
}

pub fn run() -> anyhow::Result<()> {
    println!("ClassCast System Check");
    println!("{}", "=".repeat(50));

    let ds = detect_display_server();
    match ds {
        DisplayServer::Wayland => {
            println!("[WARN] Display server: Wayland (screen capture unavailable, camera and mic only)")
        }
        DisplayServer::Unknown => println!("[WARN] Display server: Unknown"),
        other => println!("[OK] Display server: {other:?}"),
    }

    if let Err(e) = init_gstreamer() {
        println!("[FAIL] {e}");
        println!();
        println!("Install GStreamer 1.x with the base and good plugin sets.");
        return Ok(());
    }
    println!("[OK] GStreamer initialized");

    let mut all_required_ok = true;
    for req in requirements(ds) {
        let available = element_available(req.element);
        let tag = match (available, req.required) {
            (true, _) => "[OK]",
            (false, true) => "[FAIL]",
            (false, false) => "[WARN]",
        };
        println!("{tag} {:<24} {}", req.element, req.purpose);
        if req.required && !available {
            all_required_ok = false;
        }
    }

    println!();
    if all_required_ok {
        println!("All required elements are available. ClassCast is ready.");
    } else {
        tracing::warn!("Required GStreamer elements are missing");
        println!("Some required elements are missing. Install gst-plugins-good.");
    }

    Ok(())
}
