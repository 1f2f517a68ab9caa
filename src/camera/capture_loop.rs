//! Background capture thread implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::capture::SharedFrame;
use super::types::{CameraError, CameraSettings, Frame, FrameFormat, Resolution};

/// Run the capture loop in a background thread.
///
/// Opens the device, reports the actual resolution (or the open error) back
/// through `info_tx`, then keeps decoding frames into the shared slot until
/// the stop flag is raised. The slot's condvar is notified once per stored
/// frame so blocked `get_frame` callers wake for fresh data, and once more
/// on exit so they observe the close.
pub fn run_capture_loop(
    settings: CameraSettings,
    shared: Arc<SharedFrame>,
    stop: Arc<AtomicBool>,
    info_tx: Sender<Result<Resolution, CameraError>>,
) {
    let index = settings.device.to_camera_index();

    let mut camera = match open_camera_with_fallback(&index, &settings) {
        Ok(cam) => cam,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = info_tx.send(Err(CameraError::StreamFailed(e.to_string())));
        return;
    }

    let res = camera.resolution();
    let _ = info_tx.send(Ok(Resolution {
        width: res.width(),
        height: res.height(),
    }));

    while !stop.load(Ordering::Relaxed) {
        if let Ok(raw_frame) = camera.frame() {
            // Decode from the camera's native format (MJPEG, YUYV, NV12, ...)
            if let Some(frame) = convert_to_rgb(&raw_frame) {
                shared.publish(frame);
            }
            // Conversion failures skip the frame; the next one usually decodes.
        }

        // Small sleep to allow checking the stop signal
        thread::sleep(Duration::from_millis(1));
    }

    let _ = camera.stop_stream();
    shared.close();
}

/// Convert a nokhwa buffer to our RGB Frame format.
///
/// Returns `None` if the conversion fails (unsupported format or corrupt data).
fn convert_to_rgb(buffer: &nokhwa::Buffer) -> Option<Frame> {
    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();

    Some(Frame {
        data: decoded.into_raw(),
        width: resolution.width(),
        height: resolution.height(),
        format: FrameFormat::Rgb,
        timestamp: Instant::now(),
    })
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    settings: &CameraSettings,
) -> Result<Camera, CameraError> {
    let requested_resolution = nokhwa::utils::Resolution::new(
        settings.resolution.width,
        settings.resolution.height,
    );

    // Format strategies in order of preference: MJPEG (widely supported on
    // the robot's USB cameras), YUYV, then whatever the device offers.
    let format_attempts: Vec<RequestedFormat> = vec![
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_resolution,
            NokhwaFrameFormat::MJPEG,
            30,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            requested_resolution,
            NokhwaFrameFormat::YUYV,
            30,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = None;

    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    let e = last_error.map(|e| e.to_string()).unwrap_or_default();
    if e.to_lowercase().contains("not found") || e.to_lowercase().contains("no device") {
        Err(CameraError::DeviceNotFound(settings.device.to_string()))
    } else {
        Err(CameraError::OpenFailed(e))
    }
}
