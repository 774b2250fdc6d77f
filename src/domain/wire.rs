//! JSON payloads exchanged between the device and the classification service
//!
//! `POST /predict` carries a [`ClassificationRequest`] and answers with a
//! [`ClassificationReply`] (HTTP 200) or an [`ErrorReply`]. `GET /health`
//! answers with a [`HealthReply`].

use serde::{Deserialize, Serialize};

/// Window of counts sent once per stride, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub counts: Vec<u32>,
    /// Local hour 0-23; the service falls back to its own clock when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    /// Day of week 0-6, Monday = 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReply {
    /// Traffic label, e.g. "low", "normal", "high", "heavy"
    pub prediction: String,
    /// Confidence in percent, 0-100
    pub confidence: f64,
    /// Gate directive: true when the label is in the service's open subset
    pub open_lane: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PredictionStats>,
}

impl ClassificationReply {
    /// Reject replies that parsed but carry unusable values
    pub fn validate(&self) -> Result<(), String> {
        if self.prediction.trim().is_empty() {
            return Err("empty prediction label".to_string());
        }
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0-100", self.confidence));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub avg_count: f64,
    pub min_count: u32,
    pub max_count: u32,
    pub hour: u32,
    pub day_of_week: u32,
    pub is_morning_rush: bool,
    pub is_evening_rush: bool,
    pub is_weekend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    pub model_type: String,
    pub classes: Vec<String>,
    pub features: Vec<String>,
    /// Number of counts `/predict` expects
    pub window_size: usize,
    /// Sampling step the window was built with, in milliseconds
    pub step_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_time_context() {
        let request = ClassificationRequest { counts: vec![1, 2, 3], hour: None, day_of_week: None };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"counts":[1,2,3]}"#);

        let request = ClassificationRequest { counts: vec![4], hour: Some(8), day_of_week: Some(2) };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["hour"], 8);
        assert_eq!(json["day_of_week"], 2);
    }

    #[test]
    fn test_reply_missing_directive_fails_to_parse() {
        let body = r#"{"prediction":"heavy","confidence":88.0}"#;
        assert!(serde_json::from_str::<ClassificationReply>(body).is_err());
    }

    #[test]
    fn test_reply_with_stats_parses() {
        let body = r#"{
            "prediction": "normal",
            "confidence": 72.5,
            "open_lane": false,
            "timestamp": "2026-10-19T08:15:00.000000",
            "stats": {
                "avg_count": 6.5, "min_count": 5, "max_count": 8,
                "hour": 8, "day_of_week": 0,
                "is_morning_rush": true, "is_evening_rush": false, "is_weekend": false
            }
        }"#;
        let reply: ClassificationReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.prediction, "normal");
        assert!(!reply.open_lane);
        assert_eq!(reply.stats.unwrap().max_count, 8);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut reply = ClassificationReply {
            prediction: "high".to_string(),
            confidence: 55.0,
            open_lane: true,
            timestamp: None,
            stats: None,
        };
        assert!(reply.validate().is_ok());

        reply.confidence = 140.0;
        assert!(reply.validate().is_err());

        reply.confidence = f64::NAN;
        assert!(reply.validate().is_err());

        reply.confidence = 50.0;
        reply.prediction = "  ".to_string();
        assert!(reply.validate().is_err());
    }
}
