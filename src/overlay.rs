//! Telemetry overlay rendering.
//!
//! Draws the HUD (crosshair, joystick vector, power/CPU/FPS text, IMU
//! readout, flash message) onto a captured frame according to the current
//! display mode. Rendering mutates the frame in place and has no other side
//! effects, so it can run on any connection thread against a telemetry
//! readout taken at the top of the cycle.

use crate::camera::Frame;
use crate::font;
use crate::telemetry::TelemetryReadout;

/// Display mode that renders the full HUD.
pub const MODE_FULL_HUD: u8 = 0;
/// Display mode that renders only the crosshair.
pub const MODE_CROSSHAIR: u8 = 1;
/// Display mode that pauses the stream (no overlay, and the streaming loop
/// skips encode/send for the cycle).
pub const MODE_PAUSED: u8 = 2;

/// Highest FPS value the HUD will display; guards the 1/interval division
/// when the interval is measured as ~0.
const MAX_DISPLAYED_FPS: i64 = 999;

/// Half-length of each crosshair arm, in pixels.
const CROSSHAIR_ARM: i32 = 20;
/// Pixel length of a full-deflection joystick vector.
const JOY_VECTOR_SCALE: f32 = 40.0;

const HUD_COLOR: (u8, u8, u8) = (0, 255, 0);
const JOY_COLOR: (u8, u8, u8) = (255, 64, 64);
const FLASH_COLOR: (u8, u8, u8) = (255, 255, 0);

/// Fixed IMU/temperature/altitude placeholder shown on the full HUD until a
/// real IMU feed is wired in.
const IMU_PLACEHOLDER: [f32; 3] = [12.2, 3.2, 168.0];
const TEMP_PLACEHOLDER: f32 = 26.3;
const ALT_PLACEHOLDER: i32 = 453;

/// Format the FPS line from the last measured frame interval.
pub fn fps_label(interval_secs: f64) -> String {
    let fps = if interval_secs > 0.0 {
        (1.0 / interval_secs).round() as i64
    } else {
        MAX_DISPLAYED_FPS
    };
    format!("FPS: {}", fps.min(MAX_DISPLAYED_FPS))
}

/// Renders telemetry overlays onto frames.
#[derive(Debug, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Draw the overlay for `readout.display_mode` onto `frame`.
    ///
    /// Mode 0 draws the full HUD, modes 1 and 3 the crosshair only, and
    /// mode 2 leaves the frame untouched (the streaming loop separately
    /// skips encoding for that mode).
    pub fn render(&self, frame: &mut Frame, readout: &TelemetryReadout) {
        match readout.display_mode {
            MODE_FULL_HUD => {
                self.draw_crosshair(frame);
                self.draw_joystick(frame, readout.joy.x, readout.joy.y);
                self.draw_text(frame, 10, 20, &readout.power_info, HUD_COLOR);
                self.draw_text(frame, 10, 35, &readout.cpu_info, HUD_COLOR);
                self.draw_text(frame, 10, 50, &fps_label(readout.frame_interval), HUD_COLOR);
                self.draw_imu(frame);
                if let Some(text) = readout.flash_message.as_deref() {
                    self.draw_text(frame, 200, 20, text, FLASH_COLOR);
                }
            }
            MODE_PAUSED => {}
            // Mode 1, mode 3, and anything out of range: crosshair only
            _ => self.draw_crosshair(frame),
        }
    }

    fn draw_crosshair(&self, frame: &mut Frame) {
        let cx = frame.width as i32 / 2;
        let cy = frame.height as i32 / 2;
        for d in -CROSSHAIR_ARM..=CROSSHAIR_ARM {
            set_pixel(frame, cx + d, cy, HUD_COLOR);
            set_pixel(frame, cx, cy + d, HUD_COLOR);
        }
    }

    /// Joystick vector from the frame center: x deflects right, y deflects
    /// up (screen y grows downward).
    fn draw_joystick(&self, frame: &mut Frame, x: f32, y: f32) {
        let cx = frame.width as i32 / 2;
        let cy = frame.height as i32 / 2;
        let tip_x = cx + (x * JOY_VECTOR_SCALE) as i32;
        let tip_y = cy - (y * JOY_VECTOR_SCALE) as i32;
        draw_line(frame, cx, cy, tip_x, tip_y, JOY_COLOR);
    }

    fn draw_imu(&self, frame: &mut Frame) {
        let line = format!(
            "IMU [{:.1}, {:.1}, {:.0}] T:{:.1}C ALT:{}M",
            IMU_PLACEHOLDER[0],
            IMU_PLACEHOLDER[1],
            IMU_PLACEHOLDER[2],
            TEMP_PLACEHOLDER,
            ALT_PLACEHOLDER
        );
        let y = frame.height.saturating_sub(20) as usize;
        self.draw_text(frame, 10, y, &line, HUD_COLOR);
    }

    fn draw_text(&self, frame: &mut Frame, x: usize, y: usize, text: &str, color: (u8, u8, u8)) {
        let width = frame.width as usize;
        let height = frame.height as usize;
        font::draw_text_line(&mut frame.data, width, height, x, y, text, color, 1);
    }
}

fn set_pixel(frame: &mut Frame, x: i32, y: i32, color: (u8, u8, u8)) {
    if x < 0 || y < 0 || x >= frame.width as i32 || y >= frame.height as i32 {
        return;
    }
    let idx = (y as usize * frame.width as usize + x as usize) * 3;
    frame.data[idx] = color.0;
    frame.data[idx + 1] = color.1;
    frame.data[idx + 2] = color.2;
}

/// Stepped line interpolation, good enough for short HUD vectors.
fn draw_line(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: (u8, u8, u8)) {
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = x0 + ((x1 - x0) as f32 * t).round() as i32;
        let y = y0 + ((y1 - y0) as f32 * t).round() as i32;
        set_pixel(frame, x, y, color);
    }
}
