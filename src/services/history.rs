//! Fixed-size circular history of per-step snapshots
//!
//! Holds the N most recent snapshots. The write cursor always points at the
//! oldest slot, which is the next one to be overwritten. The buffer is
//! allocated once and never resized.

use crate::domain::types::ColdStartFill;
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
pub struct CircularHistory {
    slots: Box<[u32]>,
    /// Next slot to write, in `[0, N)`
    idx: usize,
    /// Snapshots written since startup
    written: u64,
}

impl CircularHistory {
    pub fn new(size: NonZeroUsize) -> Self {
        Self { slots: vec![0; size.get()].into_boxed_slice(), idx: 0, written: 0 }
    }

    /// Overwrite the oldest slot and advance the cursor
    pub fn push(&mut self, value: u32) {
        self.slots[self.idx] = value;
        self.idx = (self.idx + 1) % self.slots.len();
        self.written += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Never true: the buffer has at least one slot
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.idx
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// True once every slot holds a real snapshot
    #[inline]
    pub fn is_warm(&self) -> bool {
        self.written >= self.slots.len() as u64
    }

    /// Materialize the window, oldest snapshot first
    ///
    /// Always returns exactly N values. Before the buffer is warm the
    /// missing history is filled according to `fill`.
    pub fn window(&self, fill: ColdStartFill) -> Vec<u32> {
        let n = self.slots.len();

        if !self.is_warm() && fill == ColdStartFill::Cycle {
            // No wrap yet: the real samples sit in slots[0..written]
            let real = self.written as usize;
            if real == 0 {
                return vec![0; n];
            }
            return (0..n).map(|i| self.slots[i % real]).collect();
        }

        // Start N slots behind the next write, (idx - N + i + N) mod N, and
        // walk forward. Under the zero policy unwritten slots are still zero.
        (0..n).map(|i| self.slots[(self.idx + i) % n]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> CircularHistory {
        CircularHistory::new(NonZeroUsize::new(n).unwrap())
    }

    #[test]
    fn test_full_wrap_reads_in_write_order() {
        let values = [5, 7, 6, 8, 7, 6, 5, 7, 8, 6, 7, 6];
        let mut history = history(12);
        for value in values {
            history.push(value);
        }
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.window(ColdStartFill::Zero), values.to_vec());
        assert_eq!(history.window(ColdStartFill::Cycle), values.to_vec());
    }

    #[test]
    fn test_window_is_last_n_for_every_k() {
        let n = 5;
        let mut history = history(n);
        let mut written = Vec::new();
        for k in 1..=23u32 {
            history.push(k * 3);
            written.push(k * 3);
            if written.len() >= n {
                let expected = written[written.len() - n..].to_vec();
                assert_eq!(history.window(ColdStartFill::Zero), expected, "k = {k}");
                assert_eq!(history.window(ColdStartFill::Cycle), expected, "k = {k}");
            }
        }
    }

    #[test]
    fn test_cold_start_zero_fill_empty() {
        let history = history(4);
        assert_eq!(history.window(ColdStartFill::Zero), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_cold_start_zero_fill_pads_front() {
        let mut history = history(4);
        history.push(3);
        history.push(9);
        history.push(4);
        // k = N-1: one leading zero, then samples oldest first
        assert_eq!(history.window(ColdStartFill::Zero), vec![0, 3, 9, 4]);
    }

    #[test]
    fn test_cold_start_cycle_fill_empty() {
        let history = history(4);
        assert_eq!(history.window(ColdStartFill::Cycle), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_cold_start_cycle_fill_repeats_samples() {
        let mut history = history(5);
        history.push(3);
        history.push(9);
        assert_eq!(history.window(ColdStartFill::Cycle), vec![3, 9, 3, 9, 3]);

        history.push(4);
        history.push(1);
        // k = N-1
        assert_eq!(history.window(ColdStartFill::Cycle), vec![3, 9, 4, 1, 3]);
    }

    #[test]
    fn test_window_length_constant() {
        let mut history = history(7);
        for k in 0..20 {
            assert_eq!(history.window(ColdStartFill::Zero).len(), 7);
            assert_eq!(history.window(ColdStartFill::Cycle).len(), 7);
            history.push(k);
        }
    }
}
