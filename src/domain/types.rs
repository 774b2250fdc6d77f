//! Shared types for the traffic gate device and classifier

use serde::{Deserialize, Serialize};

/// Logical gate position
///
/// The single persisted actuator state. Only the gate sequencer changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    #[default]
    Closed,
    Open,
}

impl GateState {
    /// Map the service's `open_lane` directive to a target state
    #[inline]
    pub fn from_directive(open_lane: bool) -> Self {
        if open_lane {
            GateState::Open
        } else {
            GateState::Closed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Closed => "closed",
            GateState::Open => "open",
        }
    }
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which beam a detector watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorRole {
    Entry,
    Exit,
}

impl SensorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorRole::Entry => "entry",
            SensorRole::Exit => "exit",
        }
    }
}

/// Logic level that means "object present"
///
/// Beam-break receivers pull the line low when interrupted; a push-button
/// stand-in reads high while pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    Low,
    High,
}

impl ActiveLevel {
    #[inline]
    pub fn is_active(self, level: bool) -> bool {
        match self {
            ActiveLevel::Low => !level,
            ActiveLevel::High => level,
        }
    }

    /// Level the line rests at when nothing is in front of the sensor
    #[inline]
    pub fn idle_level(self) -> bool {
        matches!(self, ActiveLevel::Low)
    }
}

/// What the per-step snapshot measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountingMode {
    /// Standing count of vehicles inside the zone, persists across snapshots
    #[default]
    Occupancy,
    /// Net vehicles counted since the previous snapshot, zeroed after each one
    Throughput,
}

impl CountingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountingMode::Occupancy => "occupancy",
            CountingMode::Throughput => "throughput",
        }
    }
}

/// How window slots are filled before the history buffer has wrapped once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartFill {
    /// Unwritten slots read as zero
    #[default]
    Zero,
    /// Repeat the real samples in write order until the window is full
    Cycle,
}

impl ColdStartFill {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColdStartFill::Zero => "zero",
            ColdStartFill::Cycle => "cycle",
        }
    }
}

/// Severity classes the classification service can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Low,
    Normal,
    High,
    Heavy,
}

impl TrafficLevel {
    pub const ALL: [TrafficLevel; 4] =
        [TrafficLevel::Low, TrafficLevel::Normal, TrafficLevel::High, TrafficLevel::Heavy];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLevel::Low => "low",
            TrafficLevel::Normal => "normal",
            TrafficLevel::High => "high",
            TrafficLevel::Heavy => "heavy",
        }
    }
}

impl std::str::FromStr for TrafficLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrafficLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown traffic level {s:?}"))
    }
}

/// Failure class of one decision cycle, rendered distinctly on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection failure or timeout
    Network,
    /// Service answered with a non-success status
    Remote,
    /// Reply body missing fields or out of range
    Parse,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Remote => "remote",
            ErrorClass::Parse => "parse",
        }
    }
}

/// Result of one decision cycle
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Classified { label: String, confidence: f64, directive: GateState },
    Failed { class: ErrorClass, detail: String },
}

impl DecisionOutcome {
    /// Gate target requested by this outcome. Failures never request one.
    pub fn directive(&self) -> Option<GateState> {
        match self {
            DecisionOutcome::Classified { directive, .. } => Some(*directive),
            DecisionOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, DecisionOutcome::Failed { .. })
    }
}
