//! Edge detection for bouncy hardware button signals.

use std::fmt;
use std::time::Duration;

/// Error returned by a debounced action.
///
/// Actions report failures instead of panicking so the debouncer can log
/// them and keep sampling.
#[derive(Debug)]
pub struct DebounceActionError(pub String);

impl fmt::Display for DebounceActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "debounced action failed: {}", self.0)
    }
}

impl std::error::Error for DebounceActionError {}

/// The action bound to a debounced button.
pub type DebounceAction = Box<dyn FnMut() -> Result<(), DebounceActionError> + Send>;

/// Converts a raw two-level button signal into a single edge-triggered
/// action.
///
/// Created on the first observed sample of a button, which seeds
/// `last_value` without firing; every later sample runs the transition
/// check. Lives for the rest of the process.
pub struct EdgeDebouncer {
    last_value: u8,
    bounce_interval: Duration,
    action: DebounceAction,
}

impl EdgeDebouncer {
    /// Bind `action` to a button whose first observed level is `initial`.
    ///
    /// `bounce_interval` is stored as metadata for future rate limiting;
    /// triggering itself is purely edge-based.
    pub fn new(initial: u8, bounce_interval: Duration, action: DebounceAction) -> Self {
        Self {
            last_value: initial,
            bounce_interval,
            action,
        }
    }

    /// Feed one sample of the button level.
    ///
    /// Fires the bound action exactly once per 1 -> 0 transition. A failing
    /// action is logged and never stops future edge detection.
    pub fn sample(&mut self, value: u8) {
        match (self.last_value, value) {
            (1, 0) => {
                // Falling edge: button released
                if let Err(e) = (self.action)() {
                    log::error!("{}", e);
                }
            }
            (0, 1) => {
                // Rising edge: reserved, currently no action
            }
            _ => {}
        }
        self.last_value = value;
    }

    /// The configured bounce interval (informational).
    pub fn bounce_interval(&self) -> Duration {
        self.bounce_interval
    }

    /// The most recently sampled level.
    pub fn last_value(&self) -> u8 {
        self.last_value
    }
}
