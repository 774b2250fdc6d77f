//! Domain models - core types and wire payloads
//!
//! This module contains the canonical data types used throughout the system:
//! - `GateState` - the persisted actuator state
//! - `DecisionOutcome` - result of one classification cycle
//! - `CountingMode` / `ColdStartFill` - sampling policies
//! - `ClassificationRequest` / `ClassificationReply` - service payloads

pub mod types;
pub mod wire;

pub use types::{
    ActiveLevel, ColdStartFill, CountingMode, DecisionOutcome, ErrorClass, GateState, SensorRole,
    TrafficLevel,
};
pub use wire::{ClassificationReply, ClassificationRequest, HealthReply};
