//! Device control loop
//!
//! One loop owns the counter, the history buffer and the decision cycle.
//! Each tick it:
//! - polls both beams and updates the counter
//! - takes a snapshot when a step is due
//! - collects a finished classification or actuation
//! - starts a request when a stride is due
//! - redraws the live view while sampling
//!
//! The round trip and the gate sequence run as spawned tasks, so sensing
//! never pauses while a request is in flight or the arm is moving. Only
//! this loop touches the counter and history; the request task gets a copy
//! of the window.


use crate::domain::types::{ColdStartFill, DecisionOutcome, GateState, SensorRole};
use crate::domain::wire::{ClassificationReply, ClassificationRequest};
use crate::infra::config::{Config, ConfigError, Timing};
use crate::infra::metrics::Metrics;
use crate::io::classifier_client::{Classifier, ClassifyError};
use crate::services::actuator::{GateHardware, GateSequencer, SequencePlan};
use crate::services::debounce::{EdgeDetector, LevelSource};
use crate::services::decision::{interpret, DecisionCycle, Phase};
use crate::services::display::{DisplayRenderer, TextDisplay};
use crate::services::history::CircularHistory;
use crate::services::occupancy::OccupancyCounter;
use crate::services::schedule::CycleClock;
use chrono::{Datelike, Local, Timelike};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type RoundTrip = (Result<ClassificationReply, ClassifyError>, u64);

/// Peripherals handed to the controller at startup
pub struct DeviceIo<H, D> {
    pub entry: Box<dyn LevelSource>,
    pub exit: Box<dyn LevelSource>,
    pub hardware: H,
    pub display: D,
}

struct Beam {
    role: SensorRole,
    source: Box<dyn LevelSource>,
    detector: EdgeDetector,
}

pub struct Controller<H, D> {
    timing: Timing,
    epoch: Instant,
    entry: Beam,
    exit: Beam,
    counter: OccupancyCounter,
    history: CircularHistory,
    cold_start: ColdStartFill,
    clock: CycleClock,
    cycle: DecisionCycle,
    renderer: DisplayRenderer,
    hardware: Arc<Mutex<H>>,
    display: Arc<Mutex<D>>,
    plan: SequencePlan,
    /// Held here between transitions, moved into the task while actuating
    sequencer: Option<GateSequencer<H, D>>,
    gate: GateState,
    classifier: Arc<dyn Classifier>,
    send_time_context: bool,
    pending: Option<JoinHandle<RoundTrip>>,
    actuation: Option<JoinHandle<GateSequencer<H, D>>>,
    last_refresh_ms: Option<u64>,
    metrics: Arc<Metrics>,
}

impl<H, D> Controller<H, D>
where
    H: GateHardware + 'static,
    D: TextDisplay + 'static,
{
    /// Validate intervals, home the gate and start the clocks
    pub fn new(
        config: &Config,
        classifier: Arc<dyn Classifier>,
        io: DeviceIo<H, D>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConfigError> {
        let timing = config.timing()?;
        let epoch = Instant::now();

        let renderer = DisplayRenderer::new(config.display_width(), config.counting_mode());
        let plan = SequencePlan::from_config(config);
        let hardware = Arc::new(Mutex::new(io.hardware));
        let display = Arc::new(Mutex::new(io.display));

        let mut sequencer =
            GateSequencer::new(hardware.clone(), display.clone(), renderer.clone(), plan);
        sequencer.home();
        metrics.set_gate_state(GateState::Closed);

        Ok(Self {
            entry: Beam {
                role: SensorRole::Entry,
                source: io.entry,
                detector: EdgeDetector::new(config.entry_active(), timing.debounce_ms),
            },
            exit: Beam {
                role: SensorRole::Exit,
                source: io.exit,
                detector: EdgeDetector::new(config.exit_active(), timing.debounce_ms),
            },
            counter: OccupancyCounter::new(config.counting_mode()),
            history: CircularHistory::new(timing.window_size),
            cold_start: config.cold_start_fill(),
            clock: CycleClock::new(&timing, 0),
            cycle: DecisionCycle::new(timing.dwell_ms),
            renderer,
            hardware,
            display,
            plan,
            sequencer: Some(sequencer),
            gate: GateState::Closed,
            classifier,
            send_time_context: config.send_time_context(),
            pending: None,
            actuation: None,
            last_refresh_ms: None,
            metrics,
            timing,
            epoch,
        })
    }

    /// Milliseconds since the controller was built
    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Run until the shutdown flag flips, then let any gate motion finish
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(self.timing.poll_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_ms = %self.timing.poll_ms,
            step_ms = %self.timing.step_ms,
            stride_ms = %self.timing.stride_ms,
            window_size = %self.timing.window_size,
            counting = %self.counter.mode().as_str(),
            cold_start = %self.cold_start.as_str(),
            "controller_started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(actuation) = self.actuation.take() {
            info!("controller_waiting_for_gate");
            if let Ok(sequencer) = actuation.await {
                self.gate = sequencer.state();
                self.sequencer = Some(sequencer);
            }
        }
        info!(gate = %self.gate, count = %self.counter.value(), "controller_stopped");
    }

    /// One pass of the control loop
    pub async fn tick(&mut self) {
        let now = self.now_ms();
        self.poll_sensors(now);
        self.poll_step(now);
        self.collect_reply(now).await;
        self.advance_dwell(now);
        self.collect_actuation().await;
        self.maybe_start_decision(now);
        self.refresh_live(now);
    }

    fn poll_sensors(&mut self, now: u64) {
        if Self::poll_beam(&mut self.entry, now) {
            self.counter.record_entry();
            self.metrics.record_entry();
            self.on_edge(SensorRole::Entry);
        }
        if Self::poll_beam(&mut self.exit, now) {
            let applied = self.counter.record_exit();
            self.metrics.record_exit(!applied);
            self.on_edge(SensorRole::Exit);
        }
    }

    fn poll_beam(beam: &mut Beam, now: u64) -> bool {
        let level = beam.source.level();
        beam.detector.sample(level, now)
    }

    fn on_edge(&mut self, role: SensorRole) {
        self.hardware.lock().chirp();
        self.metrics.set_occupancy(self.counter.value());
        debug!(sensor = %role.as_str(), count = %self.counter.value(), "beam_edge");
        // Show the new count right away
        self.last_refresh_ms = None;
    }

    fn poll_step(&mut self, now: u64) {
        let Some(dropped) = self.clock.poll_step(now) else {
            return;
        };
        let value = self.counter.snapshot();
        self.history.push(value);
        self.metrics.record_snapshot(dropped);
        self.metrics.set_occupancy(self.counter.value());

        if dropped > 0 {
            warn!(dropped_steps = %dropped, "step_snapshots_dropped");
        }
        debug!(value = %value, cursor = %self.history.cursor(), "step_snapshot");
    }

    async fn collect_reply(&mut self, now: u64) {
        if !self.pending.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.pending.take() else {
            return;
        };

        let (result, latency_ms) = match handle.await {
            Ok(round_trip) => round_trip,
            Err(e) => (Err(ClassifyError::Transport(format!("request task failed: {e}"))), 0),
        };

        let outcome = interpret(result);
        match &outcome {
            DecisionOutcome::Classified { label, confidence, directive } => {
                info!(
                    prediction = %label,
                    confidence = %confidence,
                    directive = %directive,
                    gate = %self.gate,
                    latency_ms = %latency_ms,
                    "decision_received"
                );
                self.metrics.record_decision_result(latency_ms, None);
            }
            DecisionOutcome::Failed { class, detail } => {
                warn!(
                    class = %class.as_str(),
                    error = %detail,
                    latency_ms = %latency_ms,
                    "decision_failed"
                );
                self.metrics.record_decision_result(latency_ms, Some(*class));
            }
        }

        self.display.lock().render(&self.renderer.result(&outcome));
        self.cycle.complete_request(outcome, now);
    }

    fn advance_dwell(&mut self, now: u64) {
        let was_showing = matches!(self.cycle.phase(), Phase::ShowingResult { .. });
        match self.cycle.finish_dwell(now, self.gate) {
            Some(target) => self.start_actuation(target),
            None if was_showing && self.cycle.is_sampling() => self.last_refresh_ms = None,
            None => {}
        }
    }

    fn start_actuation(&mut self, target: GateState) {
        let Some(mut sequencer) = self.sequencer.take() else {
            error!(requested = %target, "gate_sequencer_missing");
            self.cycle.finish_actuation();
            return;
        };
        self.metrics.set_gate_moving();
        self.actuation = Some(tokio::spawn(async move {
            sequencer.transition(target).await;
            sequencer
        }));
    }

    async fn collect_actuation(&mut self) {
        if !self.actuation.as_ref().is_some_and(|h| h.is_finished()) {
            return;
        }
        let Some(handle) = self.actuation.take() else {
            return;
        };

        let sequencer = match handle.await {
            Ok(sequencer) => sequencer,
            Err(e) => {
                // Arm position unknown; drive it home
                error!(error = %e, "gate_sequence_failed");
                let mut sequencer = GateSequencer::new(
                    self.hardware.clone(),
                    self.display.clone(),
                    self.renderer.clone(),
                    self.plan,
                );
                sequencer.home();
                sequencer
            }
        };

        self.gate = sequencer.state();
        self.sequencer = Some(sequencer);
        self.metrics.set_gate_state(self.gate);
        self.metrics.record_actuation();
        self.cycle.finish_actuation();
        self.last_refresh_ms = None;
    }

    fn maybe_start_decision(&mut self, now: u64) {
        // A stride that falls due outside Sampling waits for it, once
        if !self.clock.decision_due(now) || !self.cycle.is_sampling() {
            return;
        }
        self.clock.mark_decision(now);
        self.cycle.begin_request(now);

        let counts = self.history.window(self.cold_start);
        let (hour, day_of_week) = if self.send_time_context {
            let local = Local::now();
            (Some(local.hour()), Some(local.weekday().num_days_from_monday()))
        } else {
            (None, None)
        };
        let request = ClassificationRequest { counts, hour, day_of_week };

        info!(
            counts = ?request.counts,
            warm = %self.history.is_warm(),
            "decision_requested"
        );
        self.metrics.record_decision_requested();
        self.display.lock().render(&self.renderer.awaiting());

        let classifier = self.classifier.clone();
        let timeout_ms = self.timing.timeout_ms;
        self.pending = Some(tokio::spawn(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                classifier.classify(&request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClassifyError::Timeout(timeout_ms)),
            };
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            (result, latency_ms)
        }));
    }

    fn refresh_live(&mut self, now: u64) {
        if !self.cycle.live_display() {
            return;
        }
        if let Some(last) = self.last_refresh_ms {
            if now.saturating_sub(last) < self.timing.refresh_ms {
                return;
            }
        }
        self.last_refresh_ms = Some(now);
        let frame = self.renderer.live(self.counter.value(), self.clock.ms_until_decision(now));
        self.display.lock().render(&frame);
    }

    pub fn count(&self) -> u32 {
        self.counter.value()
    }

    pub fn gate(&self) -> GateState {
        self.gate
    }

    pub fn phase(&self) -> &Phase {
        self.cycle.phase()
    }

    pub fn clock(&self) -> &CycleClock {
        &self.clock
    }

    pub fn history(&self) -> &CircularHistory {
        &self.history
    }

    pub fn hardware(&self) -> &Arc<Mutex<H>> {
        &self.hardware
    }

    pub fn display(&self) -> &Arc<Mutex<D>> {
        &self.display
    }
}
