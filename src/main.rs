//! Traffic gate device runtime
//!
//! Counts vehicles with two beams, asks the classification service for a
//! traffic level once per stride, and opens or closes the relief lane.
//!
//! Module structure:
//! - `domain/` - Core types and wire payloads
//! - `io/` - External interfaces (classifier client, beams, panel, Prometheus)
//! - `services/` - Business logic (debounce, history, decision cycle, gate)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use traffic_gate::infra::{Config, Metrics};
use traffic_gate::io::beam_input::{run_stdin_feeder, run_synthetic_traffic};
use traffic_gate::io::{ConsolePanel, HttpClassifier, SharedBeam};
use traffic_gate::services::{Controller, DeviceIo};

/// Traffic gate - beam counting and lane control device
#[derive(Parser, Debug)]
#[command(name = "traffic-gate", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/device.toml")]
    config: String,

    /// Generate synthetic traffic, one vehicle attempt every N milliseconds
    #[arg(long)]
    synthetic_ms: Option<u64>,

    /// Do not read `in` / `out` beam commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

/// How long a simulated vehicle keeps a beam broken
const BEAM_HOLD: Duration = Duration::from_millis(80);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(build = %env!("GIT_HASH"), "traffic-gate starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    // Interval errors are fatal before anything starts
    let timing = config.timing()?;

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        service_url = %config.service_url(),
        timeout_ms = %timing.timeout_ms,
        step_ms = %timing.step_ms,
        stride_ms = %timing.stride_ms,
        window_size = %timing.window_size,
        debounce_ms = %timing.debounce_ms,
        counting = %config.counting_mode().as_str(),
        cold_start = %config.cold_start_fill().as_str(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let classifier = Arc::new(HttpClassifier::new(config.service_url(), timing.timeout_ms)?);

    // A window shape mismatch is fatal; an unreachable service is not
    if let Err(mismatch) = classifier.verify_window_shape(&timing).await {
        error!(error = %mismatch, "window_shape_mismatch");
        return Err(mismatch.into());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Start Prometheus metrics server (if enabled)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_shutdown = shutdown_rx.clone();
        let site_id = config.site_id().to_string();
        tokio::spawn(async move {
            if let Err(e) = traffic_gate::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                site_id,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let entry = SharedBeam::new(config.entry_active());
    let exit = SharedBeam::new(config.exit_active());

    if !args.no_stdin {
        tokio::spawn(run_stdin_feeder(entry.clone(), exit.clone(), BEAM_HOLD, shutdown_rx.clone()));
    }
    if let Some(period_ms) = args.synthetic_ms {
        tokio::spawn(run_synthetic_traffic(
            entry.clone(),
            exit.clone(),
            Duration::from_millis(period_ms.max(1)),
            BEAM_HOLD,
            shutdown_rx.clone(),
        ));
    }

    let io = DeviceIo {
        entry: Box::new(entry),
        exit: Box::new(exit),
        hardware: ConsolePanel::new(config.display_width()),
        display: ConsolePanel::new(config.display_width()),
    };
    let mut controller = Controller::new(&config, classifier, io, metrics.clone())?;

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;

    metrics.report().log();
    info!("traffic-gate shutdown complete");
    Ok(())
}
