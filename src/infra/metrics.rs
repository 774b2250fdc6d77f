//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so the control loop never blocks on
//! a reporter. Reporting swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering. They are statistical counters
//! only and must not drive coordination or control decisions.

use crate::domain::types::{ErrorClass, GateState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Round-trip latency bucket boundaries (milliseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120
const BUCKET_BOUNDS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Gate state values for the Prometheus gauge
pub const GATE_STATE_CLOSED: u64 = 0;
pub const GATE_STATE_MOVING: u64 = 1;
pub const GATE_STATE_OPEN: u64 = 2;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120, 10240];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector for the device control loop
pub struct Metrics {
    /// Accepted entry edges (monotonic)
    entries_total: AtomicU64,
    /// Accepted exit edges (monotonic)
    exits_total: AtomicU64,
    /// Exit edges that hit the zero clamp (monotonic)
    exits_clamped_total: AtomicU64,
    /// Snapshots written to the history buffer (monotonic)
    snapshots_total: AtomicU64,
    /// Step intervals skipped because the loop ran late (monotonic)
    steps_dropped_total: AtomicU64,
    /// Decision requests issued (monotonic)
    decisions_total: AtomicU64,
    /// Decisions that produced a usable classification (monotonic)
    decisions_ok_total: AtomicU64,
    decisions_failed_network: AtomicU64,
    decisions_failed_remote: AtomicU64,
    decisions_failed_parse: AtomicU64,
    /// Completed gate transitions (monotonic)
    actuations_total: AtomicU64,
    /// Current gate state (0=closed, 1=moving, 2=open)
    gate_state: AtomicU64,
    /// Current value of the occupancy counter
    occupancy: AtomicU64,
    /// Round-trip latency histogram (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    latency_sum_ms: AtomicU64,
    latency_max_ms: AtomicU64,
    latency_count: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            entries_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            exits_clamped_total: AtomicU64::new(0),
            snapshots_total: AtomicU64::new(0),
            steps_dropped_total: AtomicU64::new(0),
            decisions_total: AtomicU64::new(0),
            decisions_ok_total: AtomicU64::new(0),
            decisions_failed_network: AtomicU64::new(0),
            decisions_failed_remote: AtomicU64::new(0),
            decisions_failed_parse: AtomicU64::new(0),
            actuations_total: AtomicU64::new(0),
            gate_state: AtomicU64::new(GATE_STATE_CLOSED),
            occupancy: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_ms: AtomicU64::new(0),
            latency_max_ms: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_entry(&self) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self, clamped: bool) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
        if clamped {
            self.exits_clamped_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_occupancy(&self, value: u32) {
        self.occupancy.store(u64::from(value), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot(&self, dropped_steps: u64) {
        self.snapshots_total.fetch_add(1, Ordering::Relaxed);
        self.steps_dropped_total.fetch_add(dropped_steps, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decision_requested(&self) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished round trip; `failure` is None on success
    pub fn record_decision_result(&self, latency_ms: u64, failure: Option<ErrorClass>) {
        match failure {
            None => self.decisions_ok_total.fetch_add(1, Ordering::Relaxed),
            Some(ErrorClass::Network) => {
                self.decisions_failed_network.fetch_add(1, Ordering::Relaxed)
            }
            Some(ErrorClass::Remote) => self.decisions_failed_remote.fetch_add(1, Ordering::Relaxed),
            Some(ErrorClass::Parse) => self.decisions_failed_parse.fetch_add(1, Ordering::Relaxed),
        };

        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn set_gate_moving(&self) {
        self.gate_state.store(GATE_STATE_MOVING, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_gate_state(&self, state: GateState) {
        let value = match state {
            GateState::Closed => GATE_STATE_CLOSED,
            GateState::Open => GATE_STATE_OPEN,
        };
        self.gate_state.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_actuation(&self) {
        self.actuations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entries_total(&self) -> u64 {
        self.entries_total.load(Ordering::Relaxed)
    }

    pub fn exits_total(&self) -> u64 {
        self.exits_total.load(Ordering::Relaxed)
    }

    pub fn snapshots_total(&self) -> u64 {
        self.snapshots_total.load(Ordering::Relaxed)
    }

    pub fn steps_dropped_total(&self) -> u64 {
        self.steps_dropped_total.load(Ordering::Relaxed)
    }

    pub fn decisions_total(&self) -> u64 {
        self.decisions_total.load(Ordering::Relaxed)
    }

    pub fn actuations_total(&self) -> u64 {
        self.actuations_total.load(Ordering::Relaxed)
    }

    pub fn gate_state(&self) -> u64 {
        self.gate_state.load(Ordering::Relaxed)
    }

    /// Generate a summary and reset periodic counters
    pub fn report(&self) -> MetricsSummary {
        let latency_count = self.latency_count.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        let latency_max_ms = self.latency_max_ms.swap(0, Ordering::Relaxed);
        let latency_buckets = swap_buckets(&self.latency_buckets);

        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed.as_secs_f64()
        };

        MetricsSummary {
            elapsed_secs,
            entries_total: self.entries_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            exits_clamped_total: self.exits_clamped_total.load(Ordering::Relaxed),
            occupancy: self.occupancy.load(Ordering::Relaxed),
            snapshots_total: self.snapshots_total.load(Ordering::Relaxed),
            steps_dropped_total: self.steps_dropped_total.load(Ordering::Relaxed),
            decisions_total: self.decisions_total.load(Ordering::Relaxed),
            decisions_ok_total: self.decisions_ok_total.load(Ordering::Relaxed),
            decisions_failed_network: self.decisions_failed_network.load(Ordering::Relaxed),
            decisions_failed_remote: self.decisions_failed_remote.load(Ordering::Relaxed),
            decisions_failed_parse: self.decisions_failed_parse.load(Ordering::Relaxed),
            actuations_total: self.actuations_total.load(Ordering::Relaxed),
            gate_state: self.gate_state.load(Ordering::Relaxed),
            latency_buckets,
            latency_count,
            latency_avg_ms: if latency_count > 0 { latency_sum / latency_count } else { 0 },
            latency_max_ms,
            latency_p95_ms: percentile_from_buckets(&latency_buckets, 0.95),
        }
    }
}

/// Metrics snapshot for logging and Prometheus export
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub elapsed_secs: f64,
    pub entries_total: u64,
    pub exits_total: u64,
    pub exits_clamped_total: u64,
    pub occupancy: u64,
    pub snapshots_total: u64,
    pub steps_dropped_total: u64,
    pub decisions_total: u64,
    pub decisions_ok_total: u64,
    pub decisions_failed_network: u64,
    pub decisions_failed_remote: u64,
    pub decisions_failed_parse: u64,
    pub actuations_total: u64,
    /// Current gate state (0=closed, 1=moving, 2=open)
    pub gate_state: u64,
    /// Round-trip latency histogram since the previous report
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_count: u64,
    pub latency_avg_ms: u64,
    pub latency_max_ms: u64,
    pub latency_p95_ms: u64,
}

impl MetricsSummary {
    pub fn decisions_failed_total(&self) -> u64 {
        self.decisions_failed_network + self.decisions_failed_remote + self.decisions_failed_parse
    }

    /// Log the summary
    pub fn log(&self) {
        info!(
            entries = %self.entries_total,
            exits = %self.exits_total,
            occupancy = %self.occupancy,
            snapshots = %self.snapshots_total,
            steps_dropped = %self.steps_dropped_total,
            decisions = %self.decisions_total,
            decisions_failed = %self.decisions_failed_total(),
            actuations = %self.actuations_total,
            gate_state = %self.gate_state,
            rtt_avg_ms = %self.latency_avg_ms,
            rtt_p95_ms = %self.latency_p95_ms,
            "metrics"
        );
    }
}
