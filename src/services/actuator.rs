//! Gate sequencer
//!
//! Runs the fixed transition: transitioning frame, hazard pulses, linear
//! sweep, state update, final frame. The sweep is open loop: the logical
//! angle is the only position the sequencer knows about. Nothing retries; if
//! power drops mid-sweep the physical arm may disagree with [`GateState`]
//! until the next transition.
//!
//! Hardware and display are shared with the control loop behind short sync
//! locks that are never held across an await.

use crate::domain::types::GateState;
use crate::infra::config::Config;
use crate::services::display::{DisplayRenderer, TextDisplay};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::info;

/// Servo, hazard lights with buzzer, and edge chirp
pub trait GateHardware: Send {
    fn set_servo_angle(&mut self, degrees: u8);
    /// Hazard LEDs and alert tone together
    fn set_hazard(&mut self, on: bool);
    /// Short confirmation beep on an accepted sensor edge
    fn chirp(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePlan {
    pub hazard_pulses: u32,
    pub pulse: Duration,
    pub sweep_step_deg: u8,
    pub sweep_step_delay: Duration,
    pub closed_angle: u8,
    pub open_angle: u8,
}

impl SequencePlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hazard_pulses: config.hazard_pulses(),
            pulse: Duration::from_millis(config.hazard_pulse_ms()),
            sweep_step_deg: config.sweep_step_deg().max(1),
            sweep_step_delay: Duration::from_millis(config.sweep_step_delay_ms()),
            closed_angle: config.closed_angle(),
            open_angle: config.open_angle(),
        }
    }

    pub fn angle_for(&self, state: GateState) -> u8 {
        match state {
            GateState::Open => self.open_angle,
            GateState::Closed => self.closed_angle,
        }
    }

    /// Intermediate and final angles from `from` to `to`, excluding `from`
    pub fn sweep(&self, from: u8, to: u8) -> Vec<u8> {
        let step = self.sweep_step_deg;
        let mut angles = Vec::new();
        let mut angle = from;
        while angle != to {
            angle = if to > angle {
                angle.saturating_add(step).min(to)
            } else {
                angle.saturating_sub(step).max(to)
            };
            angles.push(angle);
        }
        angles
    }
}

/// Owns the logical gate state and the current arm angle
pub struct GateSequencer<H, D> {
    hardware: Arc<Mutex<H>>,
    display: Arc<Mutex<D>>,
    renderer: DisplayRenderer,
    plan: SequencePlan,
    state: GateState,
    angle: u8,
}

impl<H: GateHardware, D: TextDisplay> GateSequencer<H, D> {
    /// Starts closed, arm at the closed angle
    pub fn new(
        hardware: Arc<Mutex<H>>,
        display: Arc<Mutex<D>>,
        renderer: DisplayRenderer,
        plan: SequencePlan,
    ) -> Self {
        let angle = plan.angle_for(GateState::Closed);
        Self { hardware, display, renderer, plan, state: GateState::Closed, angle }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn angle(&self) -> u8 {
        self.angle
    }

    /// Drive the arm to the closed position without a sequence
    pub fn home(&mut self) {
        self.angle = self.plan.angle_for(GateState::Closed);
        self.state = GateState::Closed;
        self.hardware.lock().set_servo_angle(self.angle);
    }

    /// Run the full transition toward `target` and return the new state
    pub async fn transition(&mut self, target: GateState) -> GateState {
        let from = self.state;
        info!(from = %from, to = %target, "gate_transition_start");

        self.display.lock().render(&self.renderer.transitioning(target));

        for _ in 0..self.plan.hazard_pulses {
            self.hardware.lock().set_hazard(true);
            sleep(self.plan.pulse).await;
            self.hardware.lock().set_hazard(false);
            sleep(self.plan.pulse).await;
        }

        let target_angle = self.plan.angle_for(target);
        for angle in self.plan.sweep(self.angle, target_angle) {
            self.hardware.lock().set_servo_angle(angle);
            self.angle = angle;
            sleep(self.plan.sweep_step_delay).await;
        }

        self.state = target;
        self.display.lock().render(&self.renderer.gate_final(target));
        info!(state = %target, angle = %self.angle, "gate_transition_done");
        target
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::types::CountingMode;
    use crate::services::display::DisplayFrame;

    /// Records every hardware call in order
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHardware {
        pub angles: Vec<u8>,
        pub hazard: Vec<bool>,
        pub chirps: u32,
    }

    impl GateHardware for RecordingHardware {
        fn set_servo_angle(&mut self, degrees: u8) {
            self.angles.push(degrees);
        }

        fn set_hazard(&mut self, on: bool) {
            self.hazard.push(on);
        }

        fn chirp(&mut self) {
            self.chirps += 1;
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingDisplay {
        pub frames: Vec<DisplayFrame>,
    }

    impl TextDisplay for RecordingDisplay {
        fn render(&mut self, frame: &DisplayFrame) {
            self.frames.push(frame.clone());
        }
    }

    fn plan(step: u8) -> SequencePlan {
        SequencePlan {
            hazard_pulses: 4,
            pulse: Duration::from_millis(250),
            sweep_step_deg: step,
            sweep_step_delay: Duration::from_millis(15),
            closed_angle: 0,
            open_angle: 90,
        }
    }

    type Recorders = (Arc<Mutex<RecordingHardware>>, Arc<Mutex<RecordingDisplay>>);

    fn sequencer(
        step: u8,
    ) -> (GateSequencer<RecordingHardware, RecordingDisplay>, Recorders) {
        let hardware = Arc::new(Mutex::new(RecordingHardware::default()));
        let display = Arc::new(Mutex::new(RecordingDisplay::default()));
        let sequencer = GateSequencer::new(
            hardware.clone(),
            display.clone(),
            DisplayRenderer::new(16, CountingMode::Occupancy),
            plan(step),
        );
        (sequencer, (hardware, display))
    }

    #[test]
    fn test_sweep_clamps_last_step() {
        let plan = plan(20);
        assert_eq!(plan.sweep(0, 90), vec![20, 40, 60, 80, 90]);
        assert_eq!(plan.sweep(90, 0), vec![70, 50, 30, 10, 0]);
        assert!(plan.sweep(45, 45).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_then_close_reverses_sweep() {
        let (mut sequencer, (hardware, display)) = sequencer(1);

        assert_eq!(sequencer.transition(GateState::Open).await, GateState::Open);
        assert_eq!(sequencer.state(), GateState::Open);
        assert_eq!(sequencer.angle(), 90);
        let opening = std::mem::take(&mut hardware.lock().angles);
        assert_eq!(opening, (1..=90).collect::<Vec<u8>>());

        assert_eq!(sequencer.transition(GateState::Closed).await, GateState::Closed);
        assert_eq!(sequencer.angle(), 0);
        let closing = std::mem::take(&mut hardware.lock().angles);

        // Path back is the path out, reversed, ending at the start angle
        let mut expected: Vec<u8> = opening.iter().rev().skip(1).copied().collect();
        expected.push(0);
        assert_eq!(closing, expected);

        let frames = &display.lock().frames;
        assert_eq!(frames[0].top, "Opening lane");
        assert_eq!(frames[1].top, "Lane OPEN");
        assert_eq!(frames[2].top, "Closing lane");
        assert_eq!(frames[3].top, "Lane CLOSED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hazard_pulses_precede_motion() {
        let (mut sequencer, (hardware, _display)) = sequencer(1);
        let started = tokio::time::Instant::now();

        sequencer.transition(GateState::Open).await;

        let hardware = hardware.lock();
        assert_eq!(hardware.hazard, [true, false].repeat(4));
        assert_eq!(hardware.chirps, 0);
        // 4 pulses of 2 x 250ms, then 90 steps of 15ms
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000 + 90 * 15), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2000 + 90 * 15 + 100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_resets_to_closed() {
        let (mut sequencer, (hardware, _display)) = sequencer(10);
        sequencer.transition(GateState::Open).await;
        sequencer.home();
        assert_eq!(sequencer.state(), GateState::Closed);
        assert_eq!(hardware.lock().angles.last(), Some(&0));
    }
}
