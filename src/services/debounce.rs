//! Debounced edge detection for beam sensors
//!
//! Turns a noisy digital level into at most one "object crossed" event per
//! debounce window. Each beam gets its own detector; detectors share nothing.

use crate::domain::types::ActiveLevel;

/// Source of a raw digital level (GPIO pin, simulated beam, test script)
pub trait LevelSource: Send {
    fn level(&mut self) -> bool;
}

/// Edge detector with a per-sensor debounce window
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    active: ActiveLevel,
    debounce_ms: u64,
    /// Last observed level, starts at the idle level
    last_level: bool,
    /// Time of the last accepted transition
    last_accepted_ms: Option<u64>,
}

impl EdgeDetector {
    pub fn new(active: ActiveLevel, debounce_ms: u64) -> Self {
        Self { active, debounce_ms, last_level: active.idle_level(), last_accepted_ms: None }
    }

    /// Feed one sample. Returns true when an "object present" edge is accepted.
    ///
    /// An edge is the transition from the idle level to the active level. It
    /// is accepted only if more than `debounce_ms` has passed since the last
    /// accepted edge on this sensor.
    pub fn sample(&mut self, level: bool, now_ms: u64) -> bool {
        let previous = std::mem::replace(&mut self.last_level, level);
        if previous == level || !self.active.is_active(level) {
            return false;
        }

        if let Some(last) = self.last_accepted_ms {
            if now_ms.saturating_sub(last) <= self.debounce_ms {
                return false;
            }
        }

        self.last_accepted_ms = Some(now_ms);
        true
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }
}
