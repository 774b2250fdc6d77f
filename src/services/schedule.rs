//! Step and stride timers for the control loop
//!
//! Times are milliseconds on the loop's monotonic clock. The step timer stays
//! on its grid: when the loop runs late by several steps, one snapshot is
//! taken and the missed intervals are reported as dropped. The stride timer
//! measures request-to-request: it restarts at the trigger time, not at the
//! reply time.

use crate::infra::config::Timing;

#[derive(Debug, Clone)]
pub struct CycleClock {
    step_ms: u64,
    stride_ms: u64,
    last_step_ms: u64,
    last_decision_ms: u64,
}

impl CycleClock {
    pub fn new(timing: &Timing, start_ms: u64) -> Self {
        Self {
            step_ms: timing.step_ms,
            stride_ms: timing.stride_ms,
            last_step_ms: start_ms,
            last_decision_ms: start_ms,
        }
    }

    /// Check the step timer
    ///
    /// Returns `Some(dropped)` when a snapshot is due, where `dropped` is the
    /// number of whole intervals that elapsed beyond the one being taken.
    pub fn poll_step(&mut self, now_ms: u64) -> Option<u64> {
        let elapsed = now_ms.saturating_sub(self.last_step_ms);
        if elapsed < self.step_ms {
            return None;
        }
        let intervals = elapsed / self.step_ms;
        self.last_step_ms += intervals * self.step_ms;
        Some(intervals - 1)
    }

    #[inline]
    pub fn decision_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_decision_ms) >= self.stride_ms
    }

    /// Restart the stride at the trigger time
    #[inline]
    pub fn mark_decision(&mut self, now_ms: u64) {
        self.last_decision_ms = now_ms;
    }

    pub fn ms_until_decision(&self, now_ms: u64) -> u64 {
        (self.last_decision_ms + self.stride_ms).saturating_sub(now_ms)
    }

    pub fn last_decision_ms(&self) -> u64 {
        self.last_decision_ms
    }

    pub fn last_step_ms(&self) -> u64 {
        self.last_step_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;

    fn clock(step_ms: u64, stride_ms: u64) -> CycleClock {
        let timing = Config::default()
            .with_intervals(step_ms, stride_ms, stride_ms)
            .with_timeout_ms(stride_ms / 2)
            .timing()
            .unwrap();
        CycleClock::new(&timing, 0)
    }

    #[test]
    fn test_step_fires_once_per_interval() {
        let mut clock = clock(100, 1000);
        assert_eq!(clock.poll_step(50), None);
        assert_eq!(clock.poll_step(100), Some(0));
        assert_eq!(clock.poll_step(150), None);
        assert_eq!(clock.poll_step(205), Some(0));
        assert_eq!(clock.last_step_ms(), 200);
    }

    #[test]
    fn test_late_loop_drops_missed_steps() {
        let mut clock = clock(100, 1000);
        assert_eq!(clock.poll_step(100), Some(0));
        // Loop stalled until t=470: 3 intervals elapsed, one snapshot taken
        assert_eq!(clock.poll_step(470), Some(2));
        // Back on the grid
        assert_eq!(clock.last_step_ms(), 400);
        assert_eq!(clock.poll_step(499), None);
        assert_eq!(clock.poll_step(500), Some(0));
    }

    #[test]
    fn test_decision_due_iff_stride_elapsed() {
        let mut clock = clock(100, 1000);
        for now in [0, 1, 500, 999] {
            assert!(!clock.decision_due(now), "now = {now}");
        }
        assert!(clock.decision_due(1000));
        assert!(clock.decision_due(1700));
    }

    #[test]
    fn test_stride_restarts_at_trigger_time() {
        let mut clock = clock(100, 1000);
        assert!(clock.decision_due(1000));
        clock.mark_decision(1000);
        // Reply arrives late at t=1600; the stride still counts from 1000
        assert!(!clock.decision_due(1600));
        assert!(!clock.decision_due(1999));
        assert!(clock.decision_due(2000));
        assert_eq!(clock.ms_until_decision(1600), 400);
    }
}
