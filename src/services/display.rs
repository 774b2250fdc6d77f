//! Two-line text display rendering
//!
//! The renderer only builds frames; pushing them to a panel is the caller's
//! job. Every line is cut to the panel width.

use crate::domain::types::{CountingMode, DecisionOutcome, ErrorClass, GateState};

/// One screenful of text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayFrame {
    pub top: String,
    pub bottom: String,
}

/// Character display (LCD, console, test recorder)
pub trait TextDisplay: Send {
    fn render(&mut self, frame: &DisplayFrame);
}

#[derive(Debug, Clone)]
pub struct DisplayRenderer {
    width: usize,
    mode: CountingMode,
}

impl DisplayRenderer {
    pub fn new(width: usize, mode: CountingMode) -> Self {
        Self { width, mode }
    }

    fn frame(&self, top: String, bottom: String) -> DisplayFrame {
        DisplayFrame { top: self.fit(top), bottom: self.fit(bottom) }
    }

    fn fit(&self, line: String) -> String {
        if line.chars().count() <= self.width {
            line
        } else {
            line.chars().take(self.width).collect()
        }
    }

    /// Live count and countdown, redrawn while sampling
    pub fn live(&self, count: u32, ms_until_decision: u64) -> DisplayFrame {
        let top = match self.mode {
            CountingMode::Occupancy => format!("Cars: {count}"),
            CountingMode::Throughput => format!("Passed: {count}"),
        };
        // Round up so the countdown never shows 0 before the request fires
        let secs = ms_until_decision.div_ceil(1000);
        self.frame(top, format!("Next in {secs}s"))
    }

    pub fn awaiting(&self) -> DisplayFrame {
        self.frame("Classifying...".to_string(), String::new())
    }

    /// Pinned result for the dwell period
    pub fn result(&self, outcome: &DecisionOutcome) -> DisplayFrame {
        match outcome {
            DecisionOutcome::Classified { label, confidence, directive } => {
                let top = format!("{} {:.0}%", label.to_uppercase(), confidence);
                let bottom = match directive {
                    GateState::Open => "Gate: OPEN",
                    GateState::Closed => "Gate: CLOSED",
                };
                self.frame(top, bottom.to_string())
            }
            DecisionOutcome::Failed { class, .. } => {
                let top = match class {
                    ErrorClass::Network => "ERR: network",
                    ErrorClass::Remote => "ERR: server",
                    ErrorClass::Parse => "ERR: bad reply",
                };
                self.frame(top.to_string(), "Gate unchanged".to_string())
            }
        }
    }

    pub fn transitioning(&self, target: GateState) -> DisplayFrame {
        let top = match target {
            GateState::Open => "Opening lane",
            GateState::Closed => "Closing lane",
        };
        self.frame(top.to_string(), "Stand clear".to_string())
    }

    pub fn gate_final(&self, state: GateState) -> DisplayFrame {
        let top = match state {
            GateState::Open => "Lane OPEN",
            GateState::Closed => "Lane CLOSED",
        };
        self.frame(top.to_string(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_frame() {
        let renderer = DisplayRenderer::new(16, CountingMode::Occupancy);
        let frame = renderer.live(7, 42_300);
        assert_eq!(frame.top, "Cars: 7");
        assert_eq!(frame.bottom, "Next in 43s");

        let renderer = DisplayRenderer::new(16, CountingMode::Throughput);
        assert_eq!(renderer.live(3, 0).top, "Passed: 3");
        assert_eq!(renderer.live(3, 0).bottom, "Next in 0s");
    }

    #[test]
    fn test_result_frame() {
        let renderer = DisplayRenderer::new(16, CountingMode::Occupancy);
        let outcome = DecisionOutcome::Classified {
            label: "heavy".to_string(),
            confidence: 87.6,
            directive: GateState::Open,
        };
        assert_eq!(
            renderer.result(&outcome),
            DisplayFrame { top: "HEAVY 88%".to_string(), bottom: "Gate: OPEN".to_string() }
        );
    }

    #[test]
    fn test_error_classes_render_distinctly() {
        let renderer = DisplayRenderer::new(16, CountingMode::Occupancy);
        let tops: Vec<String> = [ErrorClass::Network, ErrorClass::Remote, ErrorClass::Parse]
            .into_iter()
            .map(|class| {
                let frame = renderer
                    .result(&DecisionOutcome::Failed { class, detail: "x".to_string() });
                assert_eq!(frame.bottom, "Gate unchanged");
                frame.top
            })
            .collect();
        assert_ne!(tops[0], tops[1]);
        assert_ne!(tops[1], tops[2]);
        assert_ne!(tops[0], tops[2]);
    }

    #[test]
    fn test_lines_truncated_to_width() {
        let renderer = DisplayRenderer::new(8, CountingMode::Occupancy);
        let frame = renderer.transitioning(GateState::Closed);
        assert_eq!(frame.top, "Closing ");
        assert_eq!(frame.bottom, "Stand cl");
        assert_eq!(renderer.live(123_456_789, 0).top, "Cars: 12");
    }
}
