//! Prometheus metrics HTTP endpoint
//!
//! Exposes device metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_sensor_metrics(&mut output, site_id, &summary);
    write_decision_metrics(&mut output, site_id, &summary);
    write_gate_metrics(&mut output, site_id, &summary);

    output
}

fn write_sensor_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "traffic_gate_entries_total",
        "Accepted entry beam edges",
        MetricType::Counter,
        site,
        summary.entries_total,
    );
    write_metric(
        output,
        "traffic_gate_exits_total",
        "Accepted exit beam edges",
        MetricType::Counter,
        site,
        summary.exits_total,
    );
    write_metric(
        output,
        "traffic_gate_exits_clamped_total",
        "Exit edges ignored because the count was already zero",
        MetricType::Counter,
        site,
        summary.exits_clamped_total,
    );
    write_metric(
        output,
        "traffic_gate_occupancy",
        "Current vehicle count",
        MetricType::Gauge,
        site,
        summary.occupancy,
    );
    write_metric(
        output,
        "traffic_gate_snapshots_total",
        "Step snapshots written to the history buffer",
        MetricType::Counter,
        site,
        summary.snapshots_total,
    );
    write_metric(
        output,
        "traffic_gate_steps_dropped_total",
        "Step intervals skipped because the loop ran late",
        MetricType::Counter,
        site,
        summary.steps_dropped_total,
    );
}

fn write_decision_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "traffic_gate_decisions_total",
        "Classification requests issued",
        MetricType::Counter,
        site,
        summary.decisions_total,
    );
    write_metric(
        output,
        "traffic_gate_decisions_ok_total",
        "Classification requests with a usable reply",
        MetricType::Counter,
        site,
        summary.decisions_ok_total,
    );

    let name = "traffic_gate_decisions_failed_total";
    let _ = writeln!(output, "# HELP {name} Failed classification requests by error class");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (class, val) in [
        ("network", summary.decisions_failed_network),
        ("remote", summary.decisions_failed_remote),
        ("parse", summary.decisions_failed_parse),
    ] {
        let _ = writeln!(output, "{name}{{site=\"{site}\",class=\"{class}\"}} {val}");
    }

    write_histogram(
        output,
        "traffic_gate_classify_latency_ms",
        "Classification round trip latency in milliseconds",
        site,
        &summary.latency_buckets,
        summary.latency_avg_ms,
    );
    write_metric(
        output,
        "traffic_gate_classify_latency_p95_ms",
        "95th percentile classification round trip",
        MetricType::Gauge,
        site,
        summary.latency_p95_ms,
    );
    write_metric(
        output,
        "traffic_gate_classify_latency_max_ms",
        "Slowest classification round trip since the last scrape",
        MetricType::Gauge,
        site,
        summary.latency_max_ms,
    );
}

fn write_gate_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "traffic_gate_actuations_total",
        "Completed gate transitions",
        MetricType::Counter,
        site,
        summary.actuations_total,
    );
    write_metric(
        output,
        "traffic_gate_state",
        "Gate state (0=closed, 1=moving, 2=open)",
        MetricType::Gauge,
        site,
        summary.gate_state,
    );
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            let mut response = text_response(StatusCode::OK, body);
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            Ok(response)
        }
        (&Method::GET, "/health") => Ok(text_response(StatusCode::OK, "ok")),
        _ => Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
