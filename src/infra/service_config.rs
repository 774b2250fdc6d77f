//! Classification service configuration
//!
//! Loaded by the `traffic-classifier` binary. `window_size` and `step_ms`
//! must agree with the device's `[sampling]` section; the device checks
//! both against `GET /health` at startup.

use crate::domain::types::TrafficLevel;
use crate::services::inference::FEATURE_COUNT;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_port() }
    }
}

/// Class centroid expressed in scaled vehicle counts
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CentroidEntry {
    pub label: TrafficLevel,
    pub count: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// Calibration factor applied to raw counts before feature assembly.
    /// Bridges small demo counts to the range the model was trained on.
    #[serde(default = "default_count_scale")]
    pub count_scale: f64,
    /// Labels for which the service answers `open_lane = true`
    #[serde(default = "default_open_labels")]
    pub open_labels: Vec<TrafficLevel>,
    #[serde(default = "default_scaler_mean")]
    pub scaler_mean: Vec<f64>,
    #[serde(default = "default_scaler_scale")]
    pub scaler_scale: Vec<f64>,
    /// Softmax temperature inverse for the centroid model
    #[serde(default = "default_sharpness")]
    pub sharpness: f64,
    #[serde(default = "default_centroids")]
    pub centroids: Vec<CentroidEntry>,
}

fn default_window_size() -> usize {
    12
}

fn default_step_ms() -> u64 {
    5000
}

fn default_count_scale() -> f64 {
    10.0
}

fn default_open_labels() -> Vec<TrafficLevel> {
    vec![TrafficLevel::Heavy, TrafficLevel::High]
}

fn default_scaler_mean() -> Vec<f64> {
    vec![80.0, 11.5, 3.0, 0.125, 0.167, 0.25, 0.286]
}

fn default_scaler_scale() -> Vec<f64> {
    vec![45.0, 6.92, 2.0, 0.331, 0.373, 0.433, 0.452]
}

fn default_sharpness() -> f64 {
    4.0
}

fn default_centroids() -> Vec<CentroidEntry> {
    vec![
        CentroidEntry { label: TrafficLevel::Low, count: 20.0 },
        CentroidEntry { label: TrafficLevel::Normal, count: 60.0 },
        CentroidEntry { label: TrafficLevel::High, count: 110.0 },
        CentroidEntry { label: TrafficLevel::Heavy, count: 160.0 },
    ]
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            step_ms: default_step_ms(),
            count_scale: default_count_scale(),
            open_labels: default_open_labels(),
            scaler_mean: default_scaler_mean(),
            scaler_scale: default_scaler_scale(),
            sharpness: default_sharpness(),
            centroids: default_centroids(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub model: ModelSection,
}

impl ServiceConfig {
    /// Load and validate a service configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let model = &self.model;
        if model.window_size == 0 {
            bail!("model.window_size must be greater than zero");
        }
        if model.step_ms == 0 {
            bail!("model.step_ms must be greater than zero");
        }
        if !model.count_scale.is_finite() || model.count_scale <= 0.0 {
            bail!("model.count_scale must be a positive number");
        }
        if !model.sharpness.is_finite() || model.sharpness <= 0.0 {
            bail!("model.sharpness must be a positive number");
        }
        if model.scaler_mean.len() != FEATURE_COUNT || model.scaler_scale.len() != FEATURE_COUNT {
            bail!("scaler_mean and scaler_scale need {FEATURE_COUNT} entries each");
        }
        if model.centroids.is_empty() {
            bail!("model.centroids must name at least one class");
        }
        Ok(())
    }
}
