//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `debounce` - Per-beam edge detection
//! - `occupancy` - Vehicle counter
//! - `history` - Circular snapshot buffer and window materialization
//! - `schedule` - Step and stride timers
//! - `decision` - Decision cycle state machine
//! - `actuator` - Gate sequencer
//! - `display` - Display frame rendering
//! - `controller` - Device control loop
//! - `inference` - Feature assembly and model for the classification service

pub mod actuator;
pub mod controller;
pub mod debounce;
pub mod decision;
pub mod display;
pub mod history;
pub mod inference;
pub mod occupancy;
pub mod schedule;

// Re-export commonly used types
pub use actuator::{GateHardware, GateSequencer};
pub use controller::{Controller, DeviceIo};
pub use debounce::{EdgeDetector, LevelSource};
pub use display::{DisplayFrame, DisplayRenderer, TextDisplay};
pub use inference::Predictor;
