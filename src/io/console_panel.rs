//! Console stand-in for the servo, hazard lights, buzzer and LCD

use crate::services::actuator::GateHardware;
use crate::services::display::{DisplayFrame, TextDisplay};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ConsolePanel {
    width: usize,
    last_frame: Option<DisplayFrame>,
    hazard: bool,
    angle: Option<u8>,
}

impl ConsolePanel {
    pub fn new(width: usize) -> Self {
        Self { width, last_frame: None, hazard: false, angle: None }
    }

    pub fn angle(&self) -> Option<u8> {
        self.angle
    }
}

impl GateHardware for ConsolePanel {
    fn set_servo_angle(&mut self, degrees: u8) {
        self.angle = Some(degrees);
        debug!(angle = %degrees, "servo_angle");
    }

    fn set_hazard(&mut self, on: bool) {
        if on != self.hazard {
            self.hazard = on;
            debug!(on = %on, "hazard");
        }
    }

    fn chirp(&mut self) {
        debug!("chirp");
    }
}

impl TextDisplay for ConsolePanel {
    fn render(&mut self, frame: &DisplayFrame) {
        // Identical frames are not redrawn
        if self.last_frame.as_ref() == Some(frame) {
            return;
        }
        let width = self.width;
        println!("| {:<width$} | {:<width$} |", frame.top, frame.bottom);
        info!(top = %frame.top, bottom = %frame.bottom, "display");
        self.last_frame = Some(frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_angle_and_hazard() {
        let mut panel = ConsolePanel::new(16);
        assert_eq!(panel.angle(), None);
        panel.set_servo_angle(45);
        panel.set_hazard(true);
        panel.set_hazard(true);
        assert_eq!(panel.angle(), Some(45));
        assert!(panel.hazard);
    }

    #[test]
    fn test_duplicate_frames_skipped() {
        let mut panel = ConsolePanel::new(16);
        let frame = DisplayFrame { top: "Cars: 1".into(), bottom: "Next in 5s".into() };
        panel.render(&frame);
        panel.render(&frame);
        assert_eq!(panel.last_frame.as_ref(), Some(&frame));
    }
}
