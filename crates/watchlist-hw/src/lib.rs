//! watchlist-hw: Camera capture for the detection loop.
//!
//! Provides V4L2-based camera access and conversion of the negotiated
//! pixel format to packed RGB.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
