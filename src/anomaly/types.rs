//! Anomaly detection type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::types::AgentRole;

/// Metric family an anomaly belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Performance,
    Behavior,
    Pattern,
    Cost,
    Error,
    Communication,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Performance => "performance",
            AnomalyType::Behavior => "behavior",
            AnomalyType::Pattern => "pattern",
            AnomalyType::Cost => "cost",
            AnomalyType::Error => "error",
            AnomalyType::Communication => "communication",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tier shared by anomalies, insights and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Ranking weight (critical=4 ... low=1)
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }

    /// Bucket a deviation score against a detection threshold
    ///
    /// Boundaries are inclusive at 1.5x, 2x and 3x the threshold; a score
    /// at or below the threshold itself is not an anomaly.
    pub fn from_deviation(score: f64, threshold: f64) -> Option<Severity> {
        if !score.is_finite() || threshold <= 0.0 {
            return None;
        }
        if score >= threshold * 3.0 {
            Some(Severity::Critical)
        } else if score >= threshold * 2.0 {
            Some(Severity::High)
        } else if score >= threshold * 1.5 {
            Some(Severity::Medium)
        } else if score > threshold {
            Some(Severity::Low)
        } else {
            None
        }
    }

    /// Severity implied by a probability estimate
    pub fn from_probability(probability: f64) -> Severity {
        if probability >= 0.9 {
            Severity::Critical
        } else if probability >= 0.7 {
            Severity::High
        } else if probability >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Detection sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Sensitivity::Low),
            "medium" => Ok(Sensitivity::Medium),
            "high" => Ok(Sensitivity::High),
            other => Err(format!("unknown sensitivity: {}", other)),
        }
    }
}

/// Z-score thresholds per sensitivity level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SensitivityThresholds {
    fn default() -> Self {
        Self {
            low: 3.0,
            medium: 2.0,
            high: 1.5,
        }
    }
}

impl SensitivityThresholds {
    pub fn for_level(&self, sensitivity: Sensitivity) -> f64 {
        match sensitivity {
            Sensitivity::Low => self.low,
            Sensitivity::Medium => self.medium,
            Sensitivity::High => self.high,
        }
    }
}

/// Quantitative evidence for an anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMetrics {
    pub actual_value: f64,
    pub expected_value: f64,
    pub deviation_score: f64,
    /// Confidence in the detection (0.0 to 1.0)
    pub confidence_level: f64,
}

/// Contextual explanation attached to an anomaly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyContext {
    pub possible_causes: Vec<String>,
    pub recommendations: Vec<String>,
    /// Session characteristics at detection time
    pub features: BTreeMap<String, f64>,
    /// Pattern id when the anomaly is a known-pattern recurrence
    pub related_pattern: Option<String>,
}

/// Suggested remediation that could be applied without human triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoResolution {
    pub action: String,
    pub description: String,
    /// Whether the action is safe to apply automatically
    pub automatic: bool,
}

/// A single detected deviation; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: String,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub session_id: Option<String>,
    pub agent: Option<AgentRole>,
    pub metrics: AnomalyMetrics,
    pub context: AnomalyContext,
    pub auto_resolution: Option<AutoResolution>,
}

impl Anomaly {
    pub fn new(
        anomaly_type: AnomalyType,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        metrics: AnomalyMetrics,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            anomaly_type,
            severity,
            title: title.into(),
            description: description.into(),
            detected_at: Utc::now(),
            session_id: None,
            agent: None,
            metrics,
            context: AnomalyContext::default(),
            auto_resolution: None,
        }
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = at;
        self
    }

    pub fn with_agent(mut self, agent: Option<AgentRole>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_causes(mut self, causes: &[&str]) -> Self {
        self.context.possible_causes = causes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_recommendations(mut self, recommendations: &[&str]) -> Self {
        self.context.recommendations = recommendations.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_features(mut self, features: BTreeMap<String, f64>) -> Self {
        self.context.features = features;
        self
    }

    pub fn with_auto_resolution(mut self, action: &str, description: &str, automatic: bool) -> Self {
        self.auto_resolution = Some(AutoResolution {
            action: action.to_string(),
            description: description.to_string(),
            automatic,
        });
        self
    }

    pub fn detected_at(mut self, at: DateTime<Utc>) -> Self {
        self.detected_at = at;
        self
    }

    /// Key identifying the recurring signature of this anomaly
    pub fn signature(&self) -> String {
        format!("{}:{}", self.anomaly_type.as_str(), normalize_title(&self.title))
    }
}

/// Lowercase, collapse whitespace and mask digits so titles compare by shape
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Recurring anomaly signature aggregated across detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPattern {
    pub id: String,
    pub anomaly_type: AnomalyType,
    /// Normalized title shared by all occurrences
    pub title: String,
    pub occurrences: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub affected_sessions: Vec<String>,
    /// Occurrences per day over the observed span
    pub frequency: f64,
    pub is_recurring: bool,
    /// Highest severity observed
    pub severity: Severity,
    /// Feature snapshot used for fuzzy matching of future sessions
    pub characteristics: BTreeMap<String, f64>,
}

/// Per-type anomaly forecast derived from early session signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedAnomaly {
    pub anomaly_type: AnomalyType,
    pub probability: f64,
    pub expected_severity: Severity,
    pub indicators: Vec<String>,
}

/// Anomaly forecast for an in-flight session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPrediction {
    pub session_id: String,
    pub predictions: Vec<PredictedAnomaly>,
    /// Mean of per-type probabilities, capped at 1.0
    pub overall_risk: f64,
    pub recommendations: Vec<String>,
}

/// Lifecycle of a detector instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    Uninitialized,
    Baselined,
    Active,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_boundaries_inclusive() {
        let t = 1.5;
        assert_eq!(Severity::from_deviation(4.5, t), Some(Severity::Critical));
        assert_eq!(Severity::from_deviation(3.0, t), Some(Severity::High));
        assert_eq!(Severity::from_deviation(2.25, t), Some(Severity::Medium));
        assert_eq!(Severity::from_deviation(2.0, t), Some(Severity::Low));
        assert_eq!(Severity::from_deviation(1.5, t), None);
        assert_eq!(Severity::from_deviation(0.3, t), None);
    }

    #[test]
    fn test_severity_ordering_and_weight() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.weight(), 4.0);
        assert_eq!(Severity::Low.weight(), 1.0);
    }

    #[test]
    fn test_thresholds_per_level() {
        let thresholds = SensitivityThresholds::default();
        assert_eq!(thresholds.for_level(Sensitivity::Low), 3.0);
        assert_eq!(thresholds.for_level(Sensitivity::Medium), 2.0);
        assert_eq!(thresholds.for_level(Sensitivity::High), 1.5);
        assert_eq!("HIGH".parse::<Sensitivity>(), Ok(Sensitivity::High));
        assert!("extreme".parse::<Sensitivity>().is_err());
    }

    #[test]
    fn test_signature_normalizes_title() {
        let metrics = AnomalyMetrics {
            actual_value: 1.0,
            expected_value: 0.0,
            deviation_score: 1.0,
            confidence_level: 0.5,
        };
        let a = Anomaly::new(AnomalyType::Error, Severity::High, "Retry  storm 3", "", metrics.clone());
        let b = Anomaly::new(AnomalyType::Error, Severity::Low, "retry storm 7", "", metrics);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), "error:retry storm #");
    }
}
