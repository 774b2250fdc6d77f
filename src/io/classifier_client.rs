//! HTTP client for the classification service
//!
//! One `POST {url}/predict` per stride. The reqwest client is built once and
//! reused; its timeout bounds every round trip so a hung service can never
//! stall the decision cycle past the stride.

use crate::domain::types::ErrorClass;
use crate::domain::wire::{ClassificationReply, ClassificationRequest, HealthReply};
use crate::infra::config::Timing;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("request timed out after {0}ms")]
    Timeout(u64),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl ClassifyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ClassifyError::Timeout(_) | ClassifyError::Transport(_) => ErrorClass::Network,
            ClassifyError::Status(_) => ErrorClass::Remote,
            ClassifyError::Malformed(_) => ErrorClass::Parse,
        }
    }
}

/// Device and service disagree on how the window is built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "window shape mismatch: device sends {device_window} counts every {device_step_ms}ms, \
     service expects {service_window} every {service_step_ms}ms"
)]
pub struct ShapeMismatch {
    pub device_window: usize,
    pub device_step_ms: u64,
    pub service_window: usize,
    pub service_step_ms: u64,
}

/// Compare the service's advertised window with the device's own timing
pub fn check_window_shape(health: &HealthReply, timing: &Timing) -> Result<(), ShapeMismatch> {
    if health.window_size == timing.window_size.get() && health.step_ms == timing.step_ms {
        return Ok(());
    }
    Err(ShapeMismatch {
        device_window: timing.window_size.get(),
        device_step_ms: timing.step_ms,
        service_window: health.window_size,
        service_step_ms: health.step_ms,
    })
}

/// Remote classification seam; the controller only sees this trait
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationReply, ClassifyError>;
}

pub struct HttpClassifier {
    base_url: String,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, ClassifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .http1_only()
            .build()
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), timeout_ms, client })
    }

    fn map_send_error(&self, e: reqwest::Error) -> ClassifyError {
        if e.is_timeout() {
            ClassifyError::Timeout(self.timeout_ms)
        } else {
            ClassifyError::Transport(e.to_string())
        }
    }

    /// Fetch `/health` so the device can check it agrees on window shape
    pub async fn health(&self) -> Result<HealthReply, ClassifyError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status.as_u16()));
        }
        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        serde_json::from_slice(&body).map_err(|e| ClassifyError::Malformed(e.to_string()))
    }

    /// Startup check against `/health`
    ///
    /// A reachable service with a different window shape is an error. An
    /// unreachable one is only logged; each cycle then reports a network
    /// failure until it comes up.
    pub async fn verify_window_shape(&self, timing: &Timing) -> Result<(), ShapeMismatch> {
        let health = match self.health().await {
            Ok(health) => health,
            Err(e) => {
                warn!(error = %e, "classifier_health_check_failed");
                return Ok(());
            }
        };
        check_window_shape(&health, timing)?;
        info!(
            model_type = %health.model_type,
            classes = ?health.classes,
            service_build = ?health.build,
            "classifier_healthy"
        );
        Ok(())
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassificationReply, ClassifyError> {
        let body =
            serde_json::to_vec(request).map_err(|e| ClassifyError::Transport(e.to_string()))?;
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status.as_u16(), "classify_http_error");
            return Err(ClassifyError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        let reply: ClassificationReply =
            serde_json::from_slice(&body).map_err(|e| ClassifyError::Malformed(e.to_string()))?;
        reply.validate().map_err(ClassifyError::Malformed)?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;

    fn health(window_size: usize, step_ms: u64) -> HealthReply {
        HealthReply {
            status: "healthy".to_string(),
            model_type: "centroid".to_string(),
            classes: vec!["low".to_string(), "heavy".to_string()],
            features: Vec::new(),
            window_size,
            step_ms,
            build: None,
        }
    }

    #[test]
    fn test_matching_window_shape_accepted() {
        let timing = Config::default().timing().unwrap();
        assert_eq!(check_window_shape(&health(12, 5000), &timing), Ok(()));
    }

    #[test]
    fn test_window_shape_mismatch_reported() {
        let timing = Config::default().timing().unwrap();

        let err = check_window_shape(&health(6, 5000), &timing).unwrap_err();
        assert_eq!(err.device_window, 12);
        assert_eq!(err.service_window, 6);

        let err = check_window_shape(&health(12, 10_000), &timing).unwrap_err();
        assert_eq!((err.device_step_ms, err.service_step_ms), (5000, 10_000));
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(ClassifyError::Timeout(5000).class(), ErrorClass::Network);
        assert_eq!(ClassifyError::Transport("refused".into()).class(), ErrorClass::Network);
        assert_eq!(ClassifyError::Status(500).class(), ErrorClass::Remote);
        assert_eq!(ClassifyError::Malformed("eof".into()).class(), ErrorClass::Parse);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpClassifier::new("http://127.0.0.1:5000/", 1000).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:5000");
    }
}
