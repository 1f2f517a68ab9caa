//! Shared telemetry state and the inbound message seam.
//!
//! The render path reads this state on every cycle while messaging-framework
//! callbacks write individual fields from their own threads. No invariant
//! spans more than one field, so each field carries its own synchronization
//! and there is no store-wide lock.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::debounce::{DebounceActionError, EdgeDebouncer};

/// Highest display mode before the cycle wraps back to 0.
pub const MAX_DISPLAY_MODE: u8 = 3;

/// Debounce metadata for the snapshot button (informational, see
/// [`EdgeDebouncer`]).
const SNAPSHOT_BOUNCE_INTERVAL: Duration = Duration::from_millis(200);

/// Joystick button index that advances the display mode.
const BUTTON_DISPLAY_MODE: usize = 9;
/// Joystick button index that triggers a snapshot on release.
const BUTTON_SNAPSHOT: usize = 5;

/// A joystick message as delivered by the messaging framework.
///
/// Axes: index 0 is horizontal, index 1 vertical, 6 and 7 are the auxiliary
/// pair. Buttons: index 9 cycles the display mode, index 5 is the snapshot
/// trigger.
#[derive(Debug, Clone, Default)]
pub struct JoyMessage {
    pub axes: Vec<f32>,
    pub buttons: Vec<i32>,
}

/// Joystick axis readings, rounded to one decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JoyAxes {
    pub x: f32,
    pub y: f32,
    pub aux_x: f32,
    pub aux_y: f32,
}

/// A flash message with its expiry stamp.
#[derive(Debug, Clone)]
struct FlashMessage {
    text: String,
    expires_at: Instant,
}

/// One consistent-enough view of the telemetry state for a single render
/// pass. Fields are read individually (no cross-field transaction), which is
/// all the overlay needs.
#[derive(Debug, Clone)]
pub struct TelemetryReadout {
    pub joy: JoyAxes,
    pub display_mode: u8,
    pub power_info: String,
    pub cpu_info: String,
    pub frame_interval: f64,
    pub flash_message: Option<String>,
}

/// Process-wide telemetry store.
///
/// Writers are the per-message callbacks (one field each); readers are the
/// streaming connections, once per frame.
pub struct TelemetryState {
    joy: Mutex<JoyAxes>,
    display_mode: AtomicU8,
    power_info: Mutex<String>,
    cpu_info: Mutex<String>,
    // f64 seconds, stored as raw bits
    frame_interval: AtomicU64,
    flash: Mutex<Option<FlashMessage>>,
    snapshot_requested: AtomicBool,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self {
            joy: Mutex::new(JoyAxes::default()),
            display_mode: AtomicU8::new(0),
            power_info: Mutex::new("N/A".to_string()),
            cpu_info: Mutex::new("N/A".to_string()),
            frame_interval: AtomicU64::new(1.0_f64.to_bits()),
            flash: Mutex::new(None),
            snapshot_requested: AtomicBool::new(false),
        }
    }

    /// Update the joystick axes.
    pub fn set_joystick(&self, axes: JoyAxes) {
        if let Ok(mut joy) = self.joy.lock() {
            *joy = axes;
        }
    }

    pub fn joystick(&self) -> JoyAxes {
        self.joy.lock().map(|joy| *joy).unwrap_or_default()
    }

    /// Advance the display mode by one, wrapping after [`MAX_DISPLAY_MODE`].
    /// Returns the new mode.
    pub fn advance_display_mode(&self) -> u8 {
        let updated = self
            .display_mode
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |mode| {
                Some(if mode >= MAX_DISPLAY_MODE { 0 } else { mode + 1 })
            });
        match updated {
            Ok(previous) => {
                if previous >= MAX_DISPLAY_MODE {
                    0
                } else {
                    previous + 1
                }
            }
            Err(current) => current,
        }
    }

    pub fn display_mode(&self) -> u8 {
        self.display_mode.load(Ordering::SeqCst)
    }

    pub fn set_power_info(&self, info: &str) {
        if let Ok(mut power) = self.power_info.lock() {
            *power = info.to_string();
        }
    }

    pub fn set_cpu_info(&self, info: &str) {
        if let Ok(mut cpu) = self.cpu_info.lock() {
            *cpu = info.to_string();
        }
    }

    /// Record the wall-clock duration of the last capture/render/encode/send
    /// cycle, in seconds.
    pub fn set_frame_interval(&self, seconds: f64) {
        self.frame_interval
            .store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn frame_interval(&self) -> f64 {
        f64::from_bits(self.frame_interval.load(Ordering::Relaxed))
    }

    /// Show `text` on the stream for `duration`, replacing any previous
    /// message. The message clears itself: reads past the expiry come back
    /// empty without any scheduled task.
    pub fn set_flash_message(&self, text: &str, duration: Duration) {
        if let Ok(mut flash) = self.flash.lock() {
            *flash = Some(FlashMessage {
                text: text.to_string(),
                expires_at: Instant::now() + duration,
            });
        }
    }

    /// The current flash message, or `None` once it has expired.
    pub fn flash_message(&self) -> Option<String> {
        let mut flash = self.flash.lock().ok()?;
        match flash.as_ref() {
            Some(msg) if msg.expires_at > Instant::now() => Some(msg.text.clone()),
            Some(_) => {
                // Expired; drop it so later reads skip the clock check.
                *flash = None;
                None
            }
            None => None,
        }
    }

    /// Ask the streaming loop to persist the next encoded frame.
    pub fn request_snapshot(&self) {
        self.snapshot_requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending snapshot request.
    ///
    /// Atomic compare-and-clear: for each `request_snapshot` call at most one
    /// caller observes `true`, so concurrent connections never double-write
    /// one request.
    pub fn take_snapshot_request(&self) -> bool {
        self.snapshot_requested
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Aggregate read for one render pass.
    pub fn readout(&self) -> TelemetryReadout {
        TelemetryReadout {
            joy: self.joystick(),
            display_mode: self.display_mode(),
            power_info: self
                .power_info
                .lock()
                .map(|s| s.clone())
                .unwrap_or_else(|_| "N/A".to_string()),
            cpu_info: self
                .cpu_info
                .lock()
                .map(|s| s.clone())
                .unwrap_or_else(|_| "N/A".to_string()),
            frame_interval: self.frame_interval(),
            flash_message: self.flash_message(),
        }
    }
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self::new()
    }
}

/// Interface the external messaging collaborator invokes when telemetry
/// arrives. One method per message kind, one authoritative handler each.
pub trait TelemetrySubscriber: Send {
    fn on_joystick(&mut self, msg: &JoyMessage);
    fn on_power(&mut self, info: &str);
    fn on_cpu(&mut self, info: &str);
}

/// The robot's telemetry handler: routes messages into a shared
/// [`TelemetryState`] and feeds the snapshot button through an edge
/// debouncer.
pub struct RobotTelemetry {
    state: Arc<TelemetryState>,
    snapshot_button: Option<EdgeDebouncer>,
}

impl RobotTelemetry {
    pub fn new(state: Arc<TelemetryState>) -> Self {
        Self {
            state,
            snapshot_button: None,
        }
    }

    fn round_axis(value: f32) -> f32 {
        (value * 10.0).round() / 10.0
    }
}

impl TelemetrySubscriber for RobotTelemetry {
    fn on_joystick(&mut self, msg: &JoyMessage) {
        let axis = |i: usize| msg.axes.get(i).copied().unwrap_or(0.0);
        self.state.set_joystick(JoyAxes {
            x: Self::round_axis(axis(0)),
            y: Self::round_axis(axis(1)),
            aux_x: Self::round_axis(axis(6)),
            aux_y: Self::round_axis(axis(7)),
        });

        if msg.buttons.get(BUTTON_DISPLAY_MODE).copied() == Some(1) {
            self.state.advance_display_mode();
        }

        let snapshot_value = match msg.buttons.get(BUTTON_SNAPSHOT).copied() {
            Some(v) => (v == 1) as u8,
            None => return,
        };
        match self.snapshot_button.as_mut() {
            Some(debouncer) => debouncer.sample(snapshot_value),
            None => {
                // First observed sample seeds the debouncer without firing.
                let state = Arc::clone(&self.state);
                self.snapshot_button = Some(EdgeDebouncer::new(
                    snapshot_value,
                    SNAPSHOT_BOUNCE_INTERVAL,
                    Box::new(move || -> Result<(), DebounceActionError> {
                        state.request_snapshot();
                        Ok(())
                    }),
                ));
            }
        }
    }

    fn on_power(&mut self, info: &str) {
        self.state.set_power_info(info);
    }

    fn on_cpu(&mut self, info: &str) {
        self.state.set_cpu_info(info);
    }
}
