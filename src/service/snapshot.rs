//! Cached analysis results and service status shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, AnomalyPattern, AnomalyPrediction};
use crate::insights::{CollaborationPatterns, Insight, PerformanceCluster};
use crate::prediction::{CapacityPlan, DailyBucket, OutcomePrediction, ResourceForecast, TrendAnalysis};
use crate::recommendations::{Recommendation, Strategy};
use crate::telemetry::TelemetryStats;

/// Result of one full analysis; replaced wholesale, never mutated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    /// Ranked, including anomaly insights
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub strategies: Vec<Strategy>,
    pub resource_optimization: Option<CapacityPlan>,
    pub resource_forecast: Option<ResourceForecast>,
    pub trends: Vec<TrendAnalysis>,
    /// Anomaly history at analysis time
    pub anomalies: Vec<Anomaly>,
    pub anomaly_patterns: Vec<AnomalyPattern>,
    pub anomaly_insights: Vec<Insight>,
    pub clusters: Vec<PerformanceCluster>,
    pub collaboration: CollaborationPatterns,
    /// Daily usage the forecast was computed from
    pub daily_buckets: Vec<DailyBucket>,
    pub sessions_analyzed: usize,
    pub last_update: Option<DateTime<Utc>>,
}

/// Per-component health flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Last corpus load enumerated sessions successfully
    pub store: bool,
    /// Detector is active on a meaningful baseline
    pub anomaly_detector: bool,
    /// At least one full analysis has completed
    pub insights_engine: bool,
    pub predictive_models: bool,
    /// Background loops are running
    pub scheduler: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub initialized: bool,
    pub sessions_analyzed: usize,
    pub insights: usize,
    pub recommendations: usize,
    pub anomalies: usize,
    pub anomaly_patterns: usize,
    pub prediction_models: usize,
    pub subscribers: usize,
    pub last_analysis: Option<DateTime<Utc>>,
    pub health: ComponentHealth,
    pub telemetry: TelemetryStats,
}

/// Result of the incremental per-session path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub session_id: String,
    pub anomalies: Vec<Anomaly>,
    pub anomaly_prediction: Option<AnomalyPrediction>,
    pub outcome: Option<OutcomePrediction>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub analyzed_at: DateTime<Utc>,
}

impl SessionAnalysis {
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            anomalies: Vec::new(),
            anomaly_prediction: None,
            outcome: None,
            insights: Vec::new(),
            recommendations: Vec::new(),
            analyzed_at: Utc::now(),
        }
    }
}
