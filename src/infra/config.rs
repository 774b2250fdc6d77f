//! Device configuration loading from TOML files
//!
//! The binary passes the `--config` path (default `config/device.toml`);
//! a missing or unreadable file falls back to built-in defaults.
//!
//! Interval settings are validated once at startup by [`Config::timing`].
//! A stride or window that is not a whole number of steps is rejected rather
//! than truncated.

use crate::domain::types::{ActiveLevel, ColdStartFill, CountingMode};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Validation failures for interval and actuator settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("window_ms {window_ms} is not a multiple of step_ms {step_ms}")]
    WindowNotMultiple { window_ms: u64, step_ms: u64 },
    #[error("stride_ms {stride_ms} is not a multiple of step_ms {step_ms}")]
    StrideNotMultiple { stride_ms: u64, step_ms: u64 },
    #[error("poll_ms {poll_ms} must be shorter than step_ms {step_ms}")]
    PollTooSlow { poll_ms: u64, step_ms: u64 },
    #[error("service timeout_ms {timeout_ms} must be shorter than stride_ms {stride_ms}")]
    TimeoutTooLong { timeout_ms: u64, stride_ms: u64 },
    #[error("open_angle and closed_angle are both {0}")]
    NoSweep(u8),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Base URL of the classification service, e.g. http://192.168.1.50:5000
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Send local hour and weekday with each window
    #[serde(default = "default_true")]
    pub send_time_context: bool,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingSection {
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_stride_ms")]
    pub stride_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub counting: CountingMode,
    #[serde(default)]
    pub cold_start: ColdStartFill,
}

fn default_poll_ms() -> u64 {
    10
}

fn default_step_ms() -> u64 {
    5000
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_stride_ms() -> u64 {
    60_000
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for SamplingSection {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            step_ms: default_step_ms(),
            window_ms: default_window_ms(),
            stride_ms: default_stride_ms(),
            debounce_ms: default_debounce_ms(),
            counting: CountingMode::default(),
            cold_start: ColdStartFill::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsSection {
    #[serde(default = "default_active_level")]
    pub entry_active: ActiveLevel,
    #[serde(default = "default_active_level")]
    pub exit_active: ActiveLevel,
}

fn default_active_level() -> ActiveLevel {
    ActiveLevel::Low
}

impl Default for SensorsSection {
    fn default() -> Self {
        Self { entry_active: default_active_level(), exit_active: default_active_level() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySection {
    /// Characters per line (16 for a 1602 LCD)
    #[serde(default = "default_display_width")]
    pub width: usize,
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// How long a decision result stays pinned
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_display_width() -> usize {
    16
}

fn default_refresh_ms() -> u64 {
    250
}

fn default_dwell_ms() -> u64 {
    3000
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            width: default_display_width(),
            refresh_ms: default_refresh_ms(),
            dwell_ms: default_dwell_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateSection {
    #[serde(default = "default_hazard_pulses")]
    pub hazard_pulses: u32,
    #[serde(default = "default_hazard_pulse_ms")]
    pub hazard_pulse_ms: u64,
    #[serde(default = "default_sweep_step_deg")]
    pub sweep_step_deg: u8,
    #[serde(default = "default_sweep_step_delay_ms")]
    pub sweep_step_delay_ms: u64,
    #[serde(default)]
    pub closed_angle: u8,
    #[serde(default = "default_open_angle")]
    pub open_angle: u8,
}

fn default_hazard_pulses() -> u32 {
    4
}

fn default_hazard_pulse_ms() -> u64 {
    250
}

fn default_sweep_step_deg() -> u8 {
    1
}

fn default_sweep_step_delay_ms() -> u64 {
    15
}

fn default_open_angle() -> u8 {
    90
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            hazard_pulses: default_hazard_pulses(),
            hazard_pulse_ms: default_hazard_pulse_ms(),
            sweep_step_deg: default_sweep_step_deg(),
            sweep_step_delay_ms: default_sweep_step_delay_ms(),
            closed_angle: 0,
            open_angle: default_open_angle(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

fn default_metrics_interval_secs() -> u64 {
    30
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), prometheus_port: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteSection {
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "junction".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteSection,
    pub service: ServiceSection,
    #[serde(default)]
    pub sampling: SamplingSection,
    #[serde(default)]
    pub sensors: SensorsSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Validated interval settings, computed once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_ms: u64,
    pub step_ms: u64,
    pub stride_ms: u64,
    /// Number of history slots, `window_ms / step_ms`
    pub window_size: NonZeroUsize,
    pub debounce_ms: u64,
    pub refresh_ms: u64,
    pub dwell_ms: u64,
    pub timeout_ms: u64,
}

/// Main configuration struct used throughout the device runtime
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    service_url: String,
    service_timeout_ms: u64,
    send_time_context: bool,
    poll_ms: u64,
    step_ms: u64,
    window_ms: u64,
    stride_ms: u64,
    debounce_ms: u64,
    counting_mode: CountingMode,
    cold_start_fill: ColdStartFill,
    entry_active: ActiveLevel,
    exit_active: ActiveLevel,
    display_width: usize,
    refresh_ms: u64,
    dwell_ms: u64,
    hazard_pulses: u32,
    hazard_pulse_ms: u64,
    sweep_step_deg: u8,
    sweep_step_delay_ms: u64,
    closed_angle: u8,
    open_angle: u8,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let sampling = SamplingSection::default();
        let sensors = SensorsSection::default();
        let display = DisplaySection::default();
        let gate = GateSection::default();
        let metrics = MetricsSection::default();
        Self {
            site_id: default_site_id(),
            service_url: "http://127.0.0.1:5000".to_string(),
            service_timeout_ms: default_timeout_ms(),
            send_time_context: true,
            poll_ms: sampling.poll_ms,
            step_ms: sampling.step_ms,
            window_ms: sampling.window_ms,
            stride_ms: sampling.stride_ms,
            debounce_ms: sampling.debounce_ms,
            counting_mode: sampling.counting,
            cold_start_fill: sampling.cold_start,
            entry_active: sensors.entry_active,
            exit_active: sensors.exit_active,
            display_width: display.width,
            refresh_ms: display.refresh_ms,
            dwell_ms: display.dwell_ms,
            hazard_pulses: gate.hazard_pulses,
            hazard_pulse_ms: gate.hazard_pulse_ms,
            sweep_step_deg: gate.sweep_step_deg,
            sweep_step_delay_ms: gate.sweep_step_delay_ms,
            closed_angle: gate.closed_angle,
            open_angle: gate.open_angle,
            metrics_interval_secs: metrics.interval_secs,
            prometheus_port: metrics.prometheus_port,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { site, service, sampling, sensors, display, gate, metrics } = toml_config;
        Self {
            site_id: site.id,
            service_url: service.url.trim_end_matches('/').to_string(),
            service_timeout_ms: service.timeout_ms,
            send_time_context: service.send_time_context,
            poll_ms: sampling.poll_ms,
            step_ms: sampling.step_ms,
            window_ms: sampling.window_ms,
            stride_ms: sampling.stride_ms,
            debounce_ms: sampling.debounce_ms,
            counting_mode: sampling.counting,
            cold_start_fill: sampling.cold_start,
            entry_active: sensors.entry_active,
            exit_active: sensors.exit_active,
            display_width: display.width,
            refresh_ms: display.refresh_ms,
            dwell_ms: display.dwell_ms,
            hazard_pulses: gate.hazard_pulses,
            hazard_pulse_ms: gate.hazard_pulse_ms,
            sweep_step_deg: gate.sweep_step_deg,
            sweep_step_delay_ms: gate.sweep_step_delay_ms,
            closed_angle: gate.closed_angle,
            open_angle: gate.open_angle,
            metrics_interval_secs: metrics.interval_secs,
            prometheus_port: metrics.prometheus_port,
            config_file,
        }
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %path,
                    error = %format!("{e:#}"),
                    "config_load_failed_using_defaults"
                );
                Self::default()
            }
        }
    }

    /// Validate intervals and derive the history size
    pub fn timing(&self) -> Result<Timing, ConfigError> {
        for (name, value) in [
            ("poll_ms", self.poll_ms),
            ("step_ms", self.step_ms),
            ("window_ms", self.window_ms),
            ("stride_ms", self.stride_ms),
            ("timeout_ms", self.service_timeout_ms),
            ("refresh_ms", self.refresh_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroValue(name));
            }
        }
        if self.hazard_pulses == 0 {
            return Err(ConfigError::ZeroValue("hazard_pulses"));
        }
        if self.hazard_pulse_ms == 0 {
            return Err(ConfigError::ZeroValue("hazard_pulse_ms"));
        }
        if self.sweep_step_deg == 0 {
            return Err(ConfigError::ZeroValue("sweep_step_deg"));
        }
        if self.display_width == 0 {
            return Err(ConfigError::ZeroValue("display width"));
        }
        if self.open_angle == self.closed_angle {
            return Err(ConfigError::NoSweep(self.open_angle));
        }
        if self.window_ms % self.step_ms != 0 {
            return Err(ConfigError::WindowNotMultiple {
                window_ms: self.window_ms,
                step_ms: self.step_ms,
            });
        }
        if self.stride_ms % self.step_ms != 0 {
            return Err(ConfigError::StrideNotMultiple {
                stride_ms: self.stride_ms,
                step_ms: self.step_ms,
            });
        }
        if self.poll_ms >= self.step_ms {
            return Err(ConfigError::PollTooSlow { poll_ms: self.poll_ms, step_ms: self.step_ms });
        }
        if self.service_timeout_ms >= self.stride_ms {
            return Err(ConfigError::TimeoutTooLong {
                timeout_ms: self.service_timeout_ms,
                stride_ms: self.stride_ms,
            });
        }

        let slots = usize::try_from(self.window_ms / self.step_ms)
            .map_err(|_| ConfigError::ZeroValue("window size"))?;
        let window_size = NonZeroUsize::new(slots).ok_or(ConfigError::ZeroValue("window size"))?;

        Ok(Timing {
            poll_ms: self.poll_ms,
            step_ms: self.step_ms,
            stride_ms: self.stride_ms,
            window_size,
            debounce_ms: self.debounce_ms,
            refresh_ms: self.refresh_ms,
            dwell_ms: self.dwell_ms,
            timeout_ms: self.service_timeout_ms,
        })
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn service_timeout_ms(&self) -> u64 {
        self.service_timeout_ms
    }

    pub fn send_time_context(&self) -> bool {
        self.send_time_context
    }

    pub fn poll_ms(&self) -> u64 {
        self.poll_ms
    }

    pub fn step_ms(&self) -> u64 {
        self.step_ms
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn stride_ms(&self) -> u64 {
        self.stride_ms
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    pub fn counting_mode(&self) -> CountingMode {
        self.counting_mode
    }

    pub fn cold_start_fill(&self) -> ColdStartFill {
        self.cold_start_fill
    }

    pub fn entry_active(&self) -> ActiveLevel {
        self.entry_active
    }

    pub fn exit_active(&self) -> ActiveLevel {
        self.exit_active
    }

    pub fn display_width(&self) -> usize {
        self.display_width
    }

    pub fn refresh_ms(&self) -> u64 {
        self.refresh_ms
    }

    pub fn dwell_ms(&self) -> u64 {
        self.dwell_ms
    }

    pub fn hazard_pulses(&self) -> u32 {
        self.hazard_pulses
    }

    pub fn hazard_pulse_ms(&self) -> u64 {
        self.hazard_pulse_ms
    }

    pub fn sweep_step_deg(&self) -> u8 {
        self.sweep_step_deg
    }

    pub fn sweep_step_delay_ms(&self) -> u64 {
        self.sweep_step_delay_ms
    }

    pub fn closed_angle(&self) -> u8 {
        self.closed_angle
    }

    pub fn open_angle(&self) -> u8 {
        self.open_angle
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder methods for tests
    #[cfg(test)]
    pub fn with_intervals(mut self, step_ms: u64, window_ms: u64, stride_ms: u64) -> Self {
        self.step_ms = step_ms;
        self.window_ms = window_ms;
        self.stride_ms = stride_ms;
        self
    }

    #[cfg(test)]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.service_timeout_ms = ms;
        self
    }

    #[cfg(test)]
    pub fn with_dwell_ms(mut self, ms: u64) -> Self {
        self.dwell_ms = ms;
        self
    }

    #[cfg(test)]
    pub fn with_counting_mode(mut self, mode: CountingMode) -> Self {
        self.counting_mode = mode;
        self
    }

    #[cfg(test)]
    pub fn with_cold_start_fill(mut self, fill: ColdStartFill) -> Self {
        self.cold_start_fill = fill;
        self
    }

    #[cfg(test)]
    pub fn with_hazard(mut self, pulses: u32, pulse_ms: u64) -> Self {
        self.hazard_pulses = pulses;
        self.hazard_pulse_ms = pulse_ms;
        self
    }

    #[cfg(test)]
    pub fn with_time_context(mut self, enabled: bool) -> Self {
        self.send_time_context = enabled;
        self
    }
}
