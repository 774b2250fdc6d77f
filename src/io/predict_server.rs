//! HTTP front end of the classification service
//!
//! - `POST /predict` with a [`ClassificationRequest`] body
//! - `GET /health`
//!
//! Request errors answer 400 and model faults answer 500, both with an
//! [`ErrorReply`] body.

use crate::domain::wire::{ClassificationRequest, ErrorReply};
use crate::services::inference::Predictor;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 64 * 1024;

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            error!(error = %e, "predict_reply_encode_failed");
            (StatusCode::INTERNAL_SERVER_ERROR, br#"{"error":"encode failed"}"#.to_vec())
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(status, &ErrorReply { error: message.into() })
}

async fn handle_predict(
    req: Request<hyper::body::Incoming>,
    predictor: &Predictor,
) -> Response<Full<Bytes>> {
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("unreadable body: {e}")),
    };

    let request: ClassificationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "predict_bad_json");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid request: {e}"));
        }
    };

    match predictor.predict(&request, chrono::Local::now().naive_local()) {
        Ok(reply) => json_response(StatusCode::OK, &reply),
        Err(e) if e.is_client_error() => {
            warn!(error = %e, "predict_rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "predict_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    predictor: Arc<Predictor>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/predict") => handle_predict(req, &predictor).await,
        (&Method::GET, "/health") => json_response(StatusCode::OK, &predictor.health()),
        _ => error_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

/// Serve on an already bound listener until the shutdown flag flips
pub async fn serve(
    listener: TcpListener,
    predictor: Arc<Predictor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let predictor = predictor.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let predictor = predictor.clone();
                                async move { handle_request(req, predictor).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "predict_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "predict_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("predict_server_shutdown");
                    return;
                }
            }
        }
    }
}

/// Bind `bind_address:port` and serve
pub async fn start_predict_server(
    bind_address: &str,
    port: u16,
    predictor: Arc<Predictor>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ip: std::net::IpAddr = bind_address.parse()?;
    let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;

    info!(
        addr = %listener.local_addr()?,
        window_size = %predictor.window_size(),
        "predict_server_started"
    );

    serve(listener, predictor, shutdown).await;
    Ok(())
}
