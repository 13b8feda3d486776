//! Predictive analytics type definitions

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::anomaly::Severity;

/// Target a prediction model is trained for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    Quality,
    Cost,
    Duration,
}

impl TargetMetric {
    pub fn all() -> [TargetMetric; 3] {
        [TargetMetric::Quality, TargetMetric::Cost, TargetMetric::Duration]
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMetric::Quality => write!(f, "quality"),
            TargetMetric::Cost => write!(f, "cost"),
            TargetMetric::Duration => write!(f, "duration"),
        }
    }
}

/// Lifecycle of the model set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Trained,
}

/// In-sample validation of a fitted model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResults {
    pub mse: f64,
    pub mae: f64,
    pub r_squared: f64,
    /// max(0, R²)
    pub accuracy: f64,
}

/// Linear model over early-session features; replaced wholesale on retrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionModel {
    pub id: String,
    pub target: TargetMetric,
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_means: Vec<f64>,
    pub target_mean: f64,
    pub validation: ValidationResults,
    pub training_examples: usize,
    pub trained_at: DateTime<Utc>,
}

impl PredictionModel {
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

/// Resource series tracked per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMetric {
    TokenUsage,
    Cost,
    SessionCount,
    ErrorCount,
    AvgPerformance,
}

impl ResourceMetric {
    pub fn all() -> [ResourceMetric; 5] {
        [
            ResourceMetric::TokenUsage,
            ResourceMetric::Cost,
            ResourceMetric::SessionCount,
            ResourceMetric::ErrorCount,
            ResourceMetric::AvgPerformance,
        ]
    }

    /// Whether larger values are better for this series
    pub fn higher_is_better(&self) -> bool {
        matches!(self, ResourceMetric::AvgPerformance)
    }
}

impl fmt::Display for ResourceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceMetric::TokenUsage => write!(f, "token_usage"),
            ResourceMetric::Cost => write!(f, "cost"),
            ResourceMetric::SessionCount => write!(f, "session_count"),
            ResourceMetric::ErrorCount => write!(f, "error_count"),
            ResourceMetric::AvgPerformance => write!(f, "avg_performance"),
        }
    }
}

/// Aggregated usage for one calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub tokens: f64,
    pub cost: f64,
    pub sessions: usize,
    pub errors: usize,
    /// Mean session score, `None` on days without sessions
    pub avg_performance: Option<f64>,
}

impl DailyBucket {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            tokens: 0.0,
            cost: 0.0,
            sessions: 0,
            errors: 0,
            avg_performance: None,
        }
    }

    pub fn value(&self, metric: ResourceMetric) -> Option<f64> {
        match metric {
            ResourceMetric::TokenUsage => Some(self.tokens),
            ResourceMetric::Cost => Some(self.cost),
            ResourceMetric::SessionCount => Some(self.sessions as f64),
            ResourceMetric::ErrorCount => Some(self.errors as f64),
            ResourceMetric::AvgPerformance => self.avg_performance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRange {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// Days ahead of the last observed day (1-based)
    pub horizon: usize,
    pub predicted: f64,
    pub range: ForecastRange,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricForecast {
    pub metric: ResourceMetric,
    pub trend_slope: f64,
    pub seasonal: bool,
    pub points: Vec<ForecastPoint>,
}

/// Projected spend over the forecast horizon
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetProjection {
    pub expected: f64,
    /// Sum of upper bounds
    pub conservative: f64,
    /// Sum of lower bounds
    pub optimistic: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceForecast {
    pub generated_at: DateTime<Utc>,
    pub days: usize,
    pub metrics: Vec<MetricForecast>,
    pub budget: BudgetProjection,
}

impl ResourceForecast {
    pub fn metric(&self, metric: ResourceMetric) -> Option<&MetricForecast> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePoint {
    pub index: usize,
    pub date: NaiveDate,
    pub before_mean: f64,
    pub after_mean: f64,
    pub relative_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendScenarios {
    pub best: f64,
    pub expected: f64,
    pub worst: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric: ResourceMetric,
    pub direction: TrendDirection,
    pub slope: f64,
    pub r_squared: f64,
    pub change_points: Vec<ChangePoint>,
    pub next_period: TrendScenarios,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyLoad {
    pub at: DateTime<Utc>,
    pub hour_of_day: u32,
    pub expected_sessions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAlert {
    pub severity: Severity,
    pub metric: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Hourly load forecast and capacity plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityPlan {
    pub generated_at: DateTime<Utc>,
    pub hourly: Vec<HourlyLoad>,
    pub peak_hour: Option<u32>,
    pub peak_load: f64,
    pub projected_cost: f64,
    pub alerts: Vec<CapacityAlert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub impact: Severity,
    pub mitigation: String,
}

/// Predicted outcome of an in-flight session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomePrediction {
    pub session_id: String,
    pub predicted_quality: Option<f64>,
    pub predicted_cost: Option<f64>,
    pub predicted_duration_ms: Option<f64>,
    /// Mean R² of the models used, within [0.1, 0.95]
    pub confidence: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub suggestions: Vec<String>,
}
