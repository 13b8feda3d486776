//! Anomaly detection
//!
//! Per-session deviation scoring against the baseline, recurring pattern
//! memory, early-signal prediction and subscriber fan-out.

pub mod detector;
pub mod patterns;
pub mod prediction;
pub mod types;

pub use detector::{unique_error_ratio, AnomalyDetector, DetectorConfig};
pub use patterns::{characteristic_features, PatternMatch, PatternTable};
pub use prediction::{AnomalyPredictor, MIN_EARLY_MESSAGES};
pub use types::{
    Anomaly, AnomalyContext, AnomalyMetrics, AnomalyPattern, AnomalyPrediction, AnomalyType,
    AutoResolution, DetectorState, PredictedAnomaly, Sensitivity, SensitivityThresholds, Severity,
};
