//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `classifier_client` - HTTP client for the classification service
//! - `predict_server` - HTTP front end of the classification service
//! - `prometheus` - Prometheus metrics HTTP endpoint
//! - `beam_input` - Beam lines driven from stdin or synthetic traffic
//! - `console_panel` - Console stand-in for gate hardware and display

pub mod beam_input;
pub mod classifier_client;
pub mod console_panel;
pub mod predict_server;
pub mod prometheus;

// Re-export commonly used types
pub use beam_input::SharedBeam;
pub use classifier_client::{
    check_window_shape, Classifier, ClassifyError, HttpClassifier, ShapeMismatch,
};
pub use console_panel::ConsolePanel;
