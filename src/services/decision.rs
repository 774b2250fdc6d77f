//! Decision cycle state machine
//!
//! ```text
//! Sampling ──stride──▶ AwaitingReply ──reply/error──▶ ShowingResult
//!    ▲                                                   │ dwell
//!    ├───────────── directive == gate, or failure ◀──────┤
//!    └──────── sequence done ◀── Actuating ◀─ directive != gate
//! ```
//!
//! Failures never reach `Actuating`: on any transport or parse failure the
//! gate keeps its state.

use crate::domain::types::{DecisionOutcome, GateState};
use crate::domain::wire::ClassificationReply;
use crate::io::classifier_client::ClassifyError;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Live view, waiting for the next stride
    Sampling,
    /// Request in flight since `since_ms`
    AwaitingReply { since_ms: u64 },
    /// Result pinned on the display until `until_ms`
    ShowingResult { until_ms: u64, outcome: DecisionOutcome },
    /// Gate sequence running toward `target`
    Actuating { target: GateState },
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Sampling => "sampling",
            Phase::AwaitingReply { .. } => "awaiting_reply",
            Phase::ShowingResult { .. } => "showing_result",
            Phase::Actuating { .. } => "actuating",
        }
    }
}

/// Map a round-trip result to the outcome shown and acted on
pub fn interpret(result: Result<ClassificationReply, ClassifyError>) -> DecisionOutcome {
    match result {
        Ok(reply) => match reply.validate() {
            Ok(()) => DecisionOutcome::Classified {
                label: reply.prediction,
                confidence: reply.confidence,
                directive: GateState::from_directive(reply.open_lane),
            },
            Err(detail) => DecisionOutcome::Failed {
                class: ClassifyError::Malformed(detail.clone()).class(),
                detail,
            },
        },
        Err(e) => DecisionOutcome::Failed { class: e.class(), detail: e.to_string() },
    }
}

/// Phase bookkeeping for one device
#[derive(Debug, Clone)]
pub struct DecisionCycle {
    phase: Phase,
    dwell_ms: u64,
}

impl DecisionCycle {
    pub fn new(dwell_ms: u64) -> Self {
        Self { phase: Phase::Sampling, dwell_ms }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    #[inline]
    pub fn is_sampling(&self) -> bool {
        self.phase == Phase::Sampling
    }

    /// Sampling → AwaitingReply. Returns false if not in `Sampling`.
    pub fn begin_request(&mut self, now_ms: u64) -> bool {
        if !self.is_sampling() {
            return false;
        }
        self.phase = Phase::AwaitingReply { since_ms: now_ms };
        true
    }

    /// AwaitingReply → ShowingResult. Returns false if no request was in flight.
    pub fn complete_request(&mut self, outcome: DecisionOutcome, now_ms: u64) -> bool {
        if !matches!(self.phase, Phase::AwaitingReply { .. }) {
            return false;
        }
        self.phase = Phase::ShowingResult { until_ms: now_ms + self.dwell_ms, outcome };
        true
    }

    /// Leave `ShowingResult` once the dwell has passed
    ///
    /// Returns the actuation target when the directive differs from `gate`,
    /// moving to `Actuating`; otherwise returns to `Sampling` and yields None.
    pub fn finish_dwell(&mut self, now_ms: u64, gate: GateState) -> Option<GateState> {
        let Phase::ShowingResult { until_ms, outcome } = &self.phase else {
            return None;
        };
        if now_ms < *until_ms {
            return None;
        }

        match outcome.directive() {
            Some(target) if target != gate => {
                self.phase = Phase::Actuating { target };
                Some(target)
            }
            _ => {
                self.phase = Phase::Sampling;
                None
            }
        }
    }

    /// Actuating → Sampling
    pub fn finish_actuation(&mut self) -> bool {
        if !matches!(self.phase, Phase::Actuating { .. }) {
            return false;
        }
        self.phase = Phase::Sampling;
        true
    }

    /// Live counts are only drawn while sampling
    #[inline]
    pub fn live_display(&self) -> bool {
        self.is_sampling()
    }
}
