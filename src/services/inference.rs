//! Feature assembly and classification for the prediction service
//!
//! The model is opaque behind [`TrafficModel`]. The shipped model is a
//! nearest-centroid classifier over the standardized average count; any
//! model that maps the seven standardized features to class probabilities
//! can replace it.

use crate::domain::types::TrafficLevel;
use crate::domain::wire::{
    ClassificationReply, ClassificationRequest, HealthReply, PredictionStats,
};
use crate::infra::service_config::ServiceConfig;
use chrono::{Datelike, NaiveDateTime, Timelike};
use thiserror::Error;

pub const FEATURE_COUNT: usize = 7;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "avg_count",
    "hour",
    "day_of_week",
    "is_morning_rush",
    "is_evening_rush",
    "is_night",
    "is_weekend",
];

pub type Features = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    #[error("Expected {expected} vehicle counts, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("hour {0} outside 0-23")]
    InvalidHour(u32),
    #[error("day_of_week {0} outside 0-6")]
    InvalidDay(u32),
    #[error("model error: {0}")]
    Model(String),
}

impl PredictError {
    /// True for errors caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        !matches!(self, PredictError::Model(_))
    }
}

/// Hour and weekday the window is classified under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
}

impl TimeContext {
    pub fn new(hour: u32, day_of_week: u32) -> Result<Self, PredictError> {
        if hour > 23 {
            return Err(PredictError::InvalidHour(hour));
        }
        if day_of_week > 6 {
            return Err(PredictError::InvalidDay(day_of_week));
        }
        Ok(Self { hour, day_of_week })
    }

    pub fn is_morning_rush(&self) -> bool {
        (7..=9).contains(&self.hour)
    }

    pub fn is_evening_rush(&self) -> bool {
        (16..=19).contains(&self.hour)
    }

    pub fn is_night(&self) -> bool {
        self.hour >= 22 || self.hour < 4
    }

    pub fn is_weekend(&self) -> bool {
        self.day_of_week >= 5
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

pub fn assemble_features(avg_count: f64, ctx: TimeContext) -> Features {
    [
        avg_count,
        f64::from(ctx.hour),
        f64::from(ctx.day_of_week),
        flag(ctx.is_morning_rush()),
        flag(ctx.is_evening_rush()),
        flag(ctx.is_night()),
        flag(ctx.is_weekend()),
    ]
}

/// Per-feature `(x - mean) / scale`
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Features,
    scale: Features,
}

impl StandardScaler {
    /// A zero scale is treated as one, leaving that feature centered only
    pub fn new(mean: &[f64], scale: &[f64]) -> Result<Self, PredictError> {
        let mean: Features = mean.try_into().map_err(|_| {
            PredictError::Model(format!("scaler mean needs {FEATURE_COUNT} entries"))
        })?;
        let mut scale: Features = scale.try_into().map_err(|_| {
            PredictError::Model(format!("scaler scale needs {FEATURE_COUNT} entries"))
        })?;
        for s in scale.iter_mut() {
            if *s == 0.0 {
                *s = 1.0;
            }
        }
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, features: &Features) -> Features {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, value) in features.iter().enumerate() {
            out[i] = (value - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_one(&self, index: usize, value: f64) -> f64 {
        (value - self.mean[index]) / self.scale[index]
    }
}

/// Opaque classifier over standardized features
pub trait TrafficModel: Send + Sync {
    fn model_type(&self) -> &str;
    fn classes(&self) -> &[TrafficLevel];
    /// One probability per entry of [`TrafficModel::classes`]
    fn predict_proba(&self, features: &Features) -> Result<Vec<f64>, PredictError>;
}

/// Softmax over negative squared distance to each class centroid
pub struct CentroidModel {
    classes: Vec<TrafficLevel>,
    /// Centroids in standardized avg_count units
    centers: Vec<f64>,
    sharpness: f64,
}

impl CentroidModel {
    pub fn new(centroids: &[(TrafficLevel, f64)], scaler: &StandardScaler, sharpness: f64) -> Self {
        Self {
            classes: centroids.iter().map(|(label, _)| *label).collect(),
            centers: centroids.iter().map(|(_, count)| scaler.transform_one(0, *count)).collect(),
            sharpness,
        }
    }
}

impl TrafficModel for CentroidModel {
    fn model_type(&self) -> &str {
        "nearest_centroid"
    }

    fn classes(&self) -> &[TrafficLevel] {
        &self.classes
    }

    fn predict_proba(&self, features: &Features) -> Result<Vec<f64>, PredictError> {
        let x = features[0];
        if !x.is_finite() {
            return Err(PredictError::Model(format!("non-finite avg_count feature {x}")));
        }
        let logits: Vec<f64> =
            self.centers.iter().map(|c| -self.sharpness * (x - c) * (x - c)).collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| e / sum).collect())
    }
}

/// Request handling independent of the HTTP layer
pub struct Predictor {
    window_size: usize,
    step_ms: u64,
    count_scale: f64,
    open_labels: Vec<TrafficLevel>,
    scaler: StandardScaler,
    model: Box<dyn TrafficModel>,
}

impl Predictor {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, PredictError> {
        let model = &config.model;
        let scaler = StandardScaler::new(&model.scaler_mean, &model.scaler_scale)?;
        let centroids: Vec<(TrafficLevel, f64)> =
            model.centroids.iter().map(|c| (c.label, c.count)).collect();
        let centroid_model = CentroidModel::new(&centroids, &scaler, model.sharpness);
        Ok(Self {
            window_size: model.window_size,
            step_ms: model.step_ms,
            count_scale: model.count_scale,
            open_labels: model.open_labels.clone(),
            scaler,
            model: Box::new(centroid_model),
        })
    }

    pub fn with_model(mut self, model: Box<dyn TrafficModel>) -> Self {
        self.model = model;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Classify one window; `now` supplies any missing time context
    pub fn predict(
        &self,
        request: &ClassificationRequest,
        now: NaiveDateTime,
    ) -> Result<ClassificationReply, PredictError> {
        let counts = &request.counts;
        if counts.len() != self.window_size {
            return Err(PredictError::WrongLength {
                expected: self.window_size,
                actual: counts.len(),
            });
        }

        let ctx = TimeContext::new(
            request.hour.unwrap_or_else(|| now.hour()),
            request.day_of_week.unwrap_or_else(|| now.weekday().num_days_from_monday()),
        )?;

        let sum: u64 = counts.iter().map(|&c| u64::from(c)).sum();
        let avg_count = sum as f64 / counts.len() as f64;

        let features = assemble_features(avg_count * self.count_scale, ctx);
        let probabilities = self.model.predict_proba(&self.scaler.transform(&features))?;

        let (best, probability) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| PredictError::Model("model returned no probabilities".to_string()))?;
        let label = *self
            .model
            .classes()
            .get(best)
            .ok_or_else(|| PredictError::Model(format!("class index {best} out of range")))?;

        let confidence = (probability * 100.0 * 100.0).round() / 100.0;
        let open_lane = self.open_labels.contains(&label);

        tracing::info!(
            prediction = %label.as_str(),
            confidence = %confidence,
            open_lane = %open_lane,
            avg_count = %avg_count,
            "prediction"
        );

        Ok(ClassificationReply {
            prediction: label.as_str().to_string(),
            confidence,
            open_lane,
            timestamp: Some(now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
            stats: Some(PredictionStats {
                avg_count: (avg_count * 10.0).round() / 10.0,
                min_count: counts.iter().copied().min().unwrap_or(0),
                max_count: counts.iter().copied().max().unwrap_or(0),
                hour: ctx.hour,
                day_of_week: ctx.day_of_week,
                is_morning_rush: ctx.is_morning_rush(),
                is_evening_rush: ctx.is_evening_rush(),
                is_weekend: ctx.is_weekend(),
            }),
        })
    }

    pub fn health(&self) -> HealthReply {
        HealthReply {
            status: "healthy".to_string(),
            model_type: self.model.model_type().to_string(),
            classes: self.model.classes().iter().map(|c| c.as_str().to_string()).collect(),
            features: FEATURE_NAMES.iter().map(|f| f.to_string()).collect(),
            window_size: self.window_size,
            step_ms: self.step_ms,
            build: option_env!("GIT_HASH").map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn predictor() -> Predictor {
        Predictor::from_config(&ServiceConfig::default()).unwrap()
    }

    /// Monday 2026-10-19
    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(hour, 15, 0).unwrap()
    }

    fn request(counts: Vec<u32>) -> ClassificationRequest {
        ClassificationRequest { counts, hour: None, day_of_week: None }
    }

    #[test]
    fn test_time_flags() {
        assert!(TimeContext::new(7, 0).unwrap().is_morning_rush());
        assert!(TimeContext::new(9, 0).unwrap().is_morning_rush());
        assert!(!TimeContext::new(10, 0).unwrap().is_morning_rush());
        assert!(TimeContext::new(19, 0).unwrap().is_evening_rush());
        assert!(TimeContext::new(22, 0).unwrap().is_night());
        assert!(TimeContext::new(3, 0).unwrap().is_night());
        assert!(!TimeContext::new(4, 0).unwrap().is_night());
        assert!(TimeContext::new(12, 5).unwrap().is_weekend());
        assert!(!TimeContext::new(12, 4).unwrap().is_weekend());
        assert_eq!(TimeContext::new(24, 0), Err(PredictError::InvalidHour(24)));
        assert_eq!(TimeContext::new(0, 7), Err(PredictError::InvalidDay(7)));
    }

    #[test]
    fn test_feature_order() {
        let features = assemble_features(65.0, TimeContext::new(8, 6).unwrap());
        assert_eq!(features, [65.0, 8.0, 6.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_scaler_zero_scale_is_identity_spread() {
        let scaler = StandardScaler::new(&[1.0; 7], &[0.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        let out = scaler.transform(&[3.0, 5.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(out[0], 2.0);
        assert_eq!(out[1], 2.0);
        assert!(StandardScaler::new(&[0.0; 3], &[1.0; 7]).is_err());
    }

    #[test]
    fn test_moderate_window_is_normal_and_closed() {
        let counts = vec![5, 7, 6, 8, 7, 6, 5, 7, 8, 6, 7, 6];
        let reply = predictor().predict(&request(counts), at(8)).unwrap();
        assert_eq!(reply.prediction, "normal");
        assert!(!reply.open_lane);
        assert!(reply.confidence > 50.0 && reply.confidence <= 100.0);

        let stats = reply.stats.unwrap();
        assert_eq!(stats.avg_count, 6.5);
        assert_eq!((stats.min_count, stats.max_count), (5, 8));
        assert_eq!((stats.hour, stats.day_of_week), (8, 0));
        assert!(stats.is_morning_rush);
        assert!(!stats.is_weekend);
    }

    #[test]
    fn test_dense_window_opens_lane() {
        let reply = predictor().predict(&request(vec![16; 12]), at(17)).unwrap();
        assert_eq!(reply.prediction, "heavy");
        assert!(reply.open_lane);
    }

    #[test]
    fn test_confidence_two_decimals() {
        let reply = predictor().predict(&request(vec![9; 12]), at(12)).unwrap();
        let scaled = reply.confidence * 100.0;
        assert!((scaled - scaled.round()).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_time_context_wins() {
        let req = ClassificationRequest { counts: vec![2; 12], hour: Some(23), day_of_week: Some(6) };
        let stats = predictor().predict(&req, at(8)).unwrap().stats.unwrap();
        assert_eq!((stats.hour, stats.day_of_week), (23, 6));
        assert!(stats.is_weekend);
        assert!(!stats.is_morning_rush);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let err = predictor().predict(&request(vec![1; 11]), at(8)).unwrap_err();
        assert_eq!(err, PredictError::WrongLength { expected: 12, actual: 11 });
        assert!(err.is_client_error());
        assert!(err.to_string().starts_with("Expected 12 vehicle counts"));
    }

    #[test]
    fn test_health_reports_window_shape() {
        let health = predictor().health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.window_size, 12);
        assert_eq!(health.step_ms, 5000);
        assert_eq!(health.features.len(), FEATURE_COUNT);
        assert_eq!(health.classes, vec!["low", "normal", "high", "heavy"]);
    }

    struct Broken;

    impl TrafficModel for Broken {
        fn model_type(&self) -> &str {
            "broken"
        }
        fn classes(&self) -> &[TrafficLevel] {
            &[]
        }
        fn predict_proba(&self, _features: &Features) -> Result<Vec<f64>, PredictError> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_model_fault_is_server_error() {
        let predictor = predictor().with_model(Box::new(Broken));
        let err = predictor.predict(&request(vec![1; 12]), at(8)).unwrap_err();
        assert!(matches!(err, PredictError::Model(_)));
        assert!(!err.is_client_error());
    }
}
