//! Camera capture module for webcam access and frame capture.
//!
//! This module provides a high-level API for camera capture operations:
//! - Device enumeration via [`list_devices`]
//! - Camera capture via [`CameraSource`], behind the [`FrameSource`] seam
//! - Configuration via [`CameraSettings`] and [`Resolution`]

mod capture;
mod capture_loop;
mod device;
mod types;

pub use capture::{CameraSource, FrameSource};
pub use device::{list_devices, DeviceSpec};
pub use types::{CameraError, CameraInfo, CameraSettings, Frame, FrameFormat, Resolution};
