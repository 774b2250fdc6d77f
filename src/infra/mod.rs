//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Device configuration (TOML loading, interval validation)
//! - `service_config` - Classification service configuration
//! - `metrics` - Lock-free metrics collection

pub mod config;
pub mod metrics;
pub mod service_config;

// Re-export commonly used types
pub use config::{Config, ConfigError, Timing};
pub use metrics::Metrics;
pub use service_config::ServiceConfig;
