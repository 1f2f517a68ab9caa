//! Camera capture handle and the frame-source seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::capture_loop::run_capture_loop;
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// Anything the streaming server can pull frames from.
///
/// All three operations must be safe to call concurrently from connection
/// threads and the shutdown path.
pub trait FrameSource: Send + Sync {
    /// Whether the source is still producing frames.
    fn is_open(&self) -> bool;

    /// Block for the next fresh frame.
    ///
    /// # Errors
    ///
    /// * `CameraError::CaptureTimeout` - no new frame arrived within `timeout`
    /// * `CameraError::Closed` - the source was released while waiting
    fn get_frame(&self, timeout: Duration) -> Result<Frame, CameraError>;

    /// Stop producing frames and wake every blocked reader. Idempotent.
    fn release(&self);
}

/// Latest-frame slot shared between the capture thread and readers.
///
/// The capture thread overwrites the slot with each decoded frame; readers
/// wait on the condvar for the sequence number to advance past what they
/// last observed, so every `get_frame` call returns a frame captured after
/// the call began.
pub struct SharedFrame {
    slot: Mutex<FrameSlot>,
    cond: Condvar,
}

struct FrameSlot {
    frame: Option<Frame>,
    seq: u64,
    closed: bool,
}

impl SharedFrame {
    fn new() -> Self {
        Self {
            slot: Mutex::new(FrameSlot {
                frame: None,
                seq: 0,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Store a fresh frame and wake all waiting readers.
    pub fn publish(&self, frame: Frame) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.frame = Some(frame);
            slot.seq += 1;
            self.cond.notify_all();
        }
    }

    /// Mark the slot closed and wake all waiting readers.
    pub fn close(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.closed = true;
            self.cond.notify_all();
        }
    }

    fn is_closed(&self) -> bool {
        self.slot.lock().map(|slot| slot.closed).unwrap_or(true)
    }

    fn wait_fresh(&self, timeout: Duration) -> Result<Frame, CameraError> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock().map_err(|_| CameraError::Closed)?;
        let start_seq = slot.seq;

        loop {
            if slot.closed {
                return Err(CameraError::Closed);
            }
            if slot.seq != start_seq {
                if let Some(frame) = slot.frame.as_ref() {
                    return Ok(frame.clone());
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CameraError::CaptureTimeout);
            }
            let (guard, _timed_out) = self
                .cond
                .wait_timeout(slot, deadline - now)
                .map_err(|_| CameraError::Closed)?;
            slot = guard;
        }
    }
}

/// Camera capture handle.
///
/// Wraps a nokhwa camera driven by a background thread that continuously
/// decodes frames into a shared latest-frame slot. Connection threads call
/// `get_frame()` concurrently; each call blocks until a frame newer than the
/// call itself is available.
pub struct CameraSource {
    shared: Arc<SharedFrame>,
    stop_signal: Arc<AtomicBool>,
    capture_thread: Mutex<Option<JoinHandle<()>>>,
    settings: CameraSettings,
    actual_resolution: Resolution,
}

impl CameraSource {
    /// Open a camera and start the background capture thread.
    ///
    /// Blocks until the device reports its actual stream resolution, so a
    /// returned `CameraSource` is already producing frames.
    ///
    /// # Errors
    ///
    /// * `CameraError::DeviceNotFound` - no device matches the spec
    /// * `CameraError::OpenFailed` / `CameraError::StreamFailed` - the device
    ///   exists but could not be opened or streamed
    pub fn open(settings: CameraSettings) -> Result<Self, CameraError> {
        let shared = Arc::new(SharedFrame::new());
        let stop_signal = Arc::new(AtomicBool::new(false));

        let (info_tx, info_rx) = mpsc::channel::<Result<Resolution, CameraError>>();

        let thread_shared = Arc::clone(&shared);
        let thread_stop = Arc::clone(&stop_signal);
        let thread_settings = settings.clone();
        let handle = std::thread::spawn(move || {
            run_capture_loop(thread_settings, thread_shared, thread_stop, info_tx);
        });

        // Wait for the thread to report success or failure
        match info_rx.recv() {
            Ok(Ok(resolution)) => Ok(Self {
                shared,
                stop_signal,
                capture_thread: Mutex::new(Some(handle)),
                settings,
                actual_resolution: resolution,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Thread died before reporting; treat as an open failure
                let _ = handle.join();
                Err(CameraError::OpenFailed(
                    "capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    /// Get the configured camera settings.
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// The resolution the device actually delivers, which may differ from
    /// the requested one.
    pub fn actual_resolution(&self) -> Resolution {
        self.actual_resolution
    }
}

impl FrameSource for CameraSource {
    fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    fn get_frame(&self, timeout: Duration) -> Result<Frame, CameraError> {
        self.shared.wait_fresh(timeout)
    }

    fn release(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.shared.close();

        // Only the first caller gets the handle; later calls are no-ops.
        let handle = self
            .capture_thread
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::FrameFormat;

    fn test_frame(tag: u8) -> Frame {
        Frame {
            data: vec![tag; 12],
            width: 2,
            height: 2,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_wait_fresh_times_out_without_publisher() {
        let shared = SharedFrame::new();
        let result = shared.wait_fresh(Duration::from_millis(20));
        assert!(matches!(result, Err(CameraError::CaptureTimeout)));
    }

    #[test]
    fn test_wait_fresh_ignores_stale_frame() {
        // A frame published before the wait begins must not satisfy it.
        let shared = SharedFrame::new();
        shared.publish(test_frame(1));
        let result = shared.wait_fresh(Duration::from_millis(20));
        assert!(matches!(result, Err(CameraError::CaptureTimeout)));
    }

    #[test]
    fn test_wait_fresh_sees_new_frame() {
        let shared = Arc::new(SharedFrame::new());
        shared.publish(test_frame(1));

        let publisher = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            publisher.publish(test_frame(2));
        });

        let frame = shared
            .wait_fresh(Duration::from_millis(500))
            .expect("fresh frame should arrive");
        assert_eq!(frame.data[0], 2);
        handle.join().unwrap();
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let shared = Arc::new(SharedFrame::new());

        let closer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            closer.close();
        });

        let result = shared.wait_fresh(Duration::from_secs(5));
        assert!(matches!(result, Err(CameraError::Closed)));
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_slot_rejects_readers() {
        let shared = SharedFrame::new();
        shared.close();
        let result = shared.wait_fresh(Duration::from_millis(20));
        assert!(matches!(result, Err(CameraError::Closed)));
        assert!(shared.is_closed());
    }
}
