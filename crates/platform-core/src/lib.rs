//! ClassCast platform core contracts.
//!
//! This crate holds the host-facing media capability contracts used by the
//! capture engine without coupling to a concrete capture backend:
//! - [`MediaTrack`] / [`MediaStream`]: live sample sources and their release
//! - [`MediaDevices`]: asynchronous display and camera/microphone acquisition
//! - [`DisplayServer`]: platform family used to pick capture sources

pub mod devices;
pub mod display;
pub mod stream;

pub use devices::*;
pub use display::*;
pub use stream::*;
