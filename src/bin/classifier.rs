//! Traffic classification service
//!
//! Stateless HTTP endpoint the device calls once per stride.
//!
//! Usage:
//!   cargo run --bin traffic-classifier -- --config config/classifier.toml

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use traffic_gate::infra::ServiceConfig;
use traffic_gate::io::predict_server::start_predict_server;
use traffic_gate::services::Predictor;

#[derive(Parser, Debug)]
#[command(name = "traffic-classifier", version, about = "Traffic level classification service")]
struct Args {
    /// Path to TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    let port = args.port.unwrap_or(config.server.port);

    let predictor = Arc::new(Predictor::from_config(&config)?);
    let health = predictor.health();
    info!(
        build = %env!("GIT_HASH"),
        model_type = %health.model_type,
        classes = ?health.classes,
        window_size = %health.window_size,
        step_ms = %health.step_ms,
        count_scale = %config.model.count_scale,
        "traffic-classifier starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    start_predict_server(&config.server.bind_address, port, predictor, shutdown_rx).await?;
    info!("traffic-classifier shutdown complete");
    Ok(())
}
