//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use traffic_gate::domain::types::{ActiveLevel, ColdStartFill, CountingMode};
use traffic_gate::infra::{Config, ConfigError, ServiceConfig};

fn write_temp(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_temp(
        r#"
[site]
id = "north-ramp"

[service]
url = "http://192.168.1.50:5000/"
timeout_ms = 3000
send_time_context = false

[sampling]
poll_ms = 5
step_ms = 2000
window_ms = 40000
stride_ms = 30000
debounce_ms = 250
counting = "throughput"
cold_start = "cycle"

[sensors]
entry_active = "high"

[display]
width = 20
dwell_ms = 2500

[gate]
hazard_pulses = 3
open_angle = 85

[metrics]
interval_secs = 15
prometheus_port = 9091
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "north-ramp");
    assert_eq!(config.service_url(), "http://192.168.1.50:5000");
    assert_eq!(config.service_timeout_ms(), 3000);
    assert!(!config.send_time_context());
    assert_eq!(config.counting_mode(), CountingMode::Throughput);
    assert_eq!(config.cold_start_fill(), ColdStartFill::Cycle);
    assert_eq!(config.entry_active(), ActiveLevel::High);
    assert_eq!(config.exit_active(), ActiveLevel::Low);
    assert_eq!(config.display_width(), 20);
    assert_eq!(config.hazard_pulses(), 3);
    assert_eq!(config.open_angle(), 85);
    assert_eq!(config.closed_angle(), 0);
    assert_eq!(config.prometheus_port(), 9091);

    let timing = config.timing().unwrap();
    assert_eq!(timing.window_size.get(), 20);
    assert_eq!(timing.stride_ms, 30_000);
    assert_eq!(timing.debounce_ms, 250);
}

#[test]
fn test_service_url_required() {
    let temp_file = write_temp("[sampling]\nstep_ms = 1000\n");
    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_misaligned_stride_rejected_at_startup() {
    let temp_file = write_temp(
        r#"
[service]
url = "http://127.0.0.1:5000"

[sampling]
step_ms = 5000
window_ms = 60000
stride_ms = 61000
"#,
    );
    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.timing(),
        Err(ConfigError::StrideNotMultiple { stride_ms: 61_000, step_ms: 5000 })
    );
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert_eq!(config.service_url(), "http://127.0.0.1:5000");
    assert_eq!(config.step_ms(), 5000);
}

#[test]
fn test_default_device_and_service_agree_on_window() {
    let timing = Config::default().timing().unwrap();
    let service = ServiceConfig::default();
    assert_eq!(timing.window_size.get(), service.model.window_size);
    assert_eq!(timing.step_ms, service.model.step_ms);
}

#[test]
fn test_shipped_configs_agree_on_window() {
    let root = env!("CARGO_MANIFEST_DIR");
    let device = Config::from_file(format!("{root}/config/device.toml")).unwrap();
    let service = ServiceConfig::from_file(format!("{root}/config/classifier.toml")).unwrap();

    let timing = device.timing().unwrap();
    assert_eq!(timing.window_size.get(), service.model.window_size);
    assert_eq!(timing.step_ms, service.model.step_ms);
}

#[test]
fn test_load_service_config_from_file() {
    let temp_file = write_temp(
        r#"
[server]
port = 5050

[model]
window_size = 6
step_ms = 10000
count_scale = 1.0
open_labels = ["heavy"]
"#,
    );
    let config = ServiceConfig::from_file(temp_file.path()).unwrap();
    assert_eq!(config.server.port, 5050);
    assert_eq!(config.server.bind_address, "0.0.0.0");
    assert_eq!(config.model.window_size, 6);
    assert_eq!(config.model.open_labels.len(), 1);
    assert_eq!(config.model.centroids.len(), 4);
}

#[test]
fn test_invalid_service_config_rejected() {
    let temp_file = write_temp("[model]\nwindow_size = 0\n");
    assert!(ServiceConfig::from_file(temp_file.path()).is_err());
}

#[test]
fn test_zero_hazard_pulses_rejected_at_startup() {
    let temp_file = write_temp(
        r#"
[service]
url = "http://127.0.0.1:5000"

[gate]
hazard_pulses = 0
"#,
    );
    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.timing(), Err(ConfigError::ZeroValue("hazard_pulses")));
}
