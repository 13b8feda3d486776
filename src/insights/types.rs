//! Insight type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::anomaly::Severity;

/// Analysis surface an insight came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Performance,
    Cost,
    Pattern,
    Trend,
    Anomaly,
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsightType::Performance => write!(f, "performance"),
            InsightType::Cost => write!(f, "cost"),
            InsightType::Pattern => write!(f, "pattern"),
            InsightType::Trend => write!(f, "trend"),
            InsightType::Anomaly => write!(f, "anomaly"),
        }
    }
}

/// A ranked analytical finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub insight_type: InsightType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    /// Heuristic confidence (0.0 to 1.0)
    pub confidence: f64,
    /// Free-form supporting data
    pub data: serde_json::Value,
    pub suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        insight_type: InsightType,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            insight_type,
            severity,
            title: title.into(),
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            data: serde_json::Value::Null,
            suggestions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Ranking key: confidence x severity weight
    pub fn rank_score(&self) -> f64 {
        self.confidence * self.severity.weight()
    }
}

/// Sort insights by rank score, highest first
pub fn rank_insights(insights: &mut [Insight]) {
    insights.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Sessions grouped by agent-switch rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateBucket {
    /// Switches per minute, rounded to 0.5
    pub rate: f64,
    pub sessions: usize,
    pub avg_success: f64,
}

/// Run-length agent sequence shared by successful sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencePattern {
    /// e.g. "M+W+"
    pub pattern: String,
    pub occurrences: usize,
    pub success_rate: f64,
}

/// Manager/worker share of one message category
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub manager: f64,
    pub worker: f64,
}

/// Share of work carried by each agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkDistribution {
    pub manager_share: f64,
    pub worker_share: f64,
    /// Both agents carry 30-70% of the work
    pub balanced: bool,
    /// Shares per message kind
    pub categories: BTreeMap<String, CategoryShare>,
}

/// Hour of day ranked by session outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHour {
    pub hour: u32,
    pub avg_score: f64,
    pub sessions: usize,
}

/// Collaboration pattern analysis result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationPatterns {
    pub exchange_rates: Vec<ExchangeRateBucket>,
    /// Rate bucket with the best average outcome
    pub optimal_exchange_rate: Option<f64>,
    /// Average gap at role changes, in milliseconds
    pub avg_handoff_ms: Option<f64>,
    pub sequences: Vec<SequencePattern>,
    pub work_distribution: WorkDistribution,
    pub peak_hours: Vec<PeakHour>,
    pub sessions_analyzed: usize,
}

/// Cluster tier, assigned by average session score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLabel {
    HighPerformers,
    AveragePerformers,
    UnderPerformers,
}

impl ClusterLabel {
    pub fn ranked() -> [ClusterLabel; 3] {
        [
            ClusterLabel::HighPerformers,
            ClusterLabel::AveragePerformers,
            ClusterLabel::UnderPerformers,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClusterLabel::HighPerformers => "High Performers",
            ClusterLabel::AveragePerformers => "Average Performers",
            ClusterLabel::UnderPerformers => "Under Performers",
        }
    }
}

/// Average characteristics of a cluster's sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterCharacteristics {
    pub avg_messages: f64,
    pub avg_errors: f64,
    pub avg_tool_calls: f64,
    pub avg_response_ms: f64,
    pub avg_cost: f64,
    pub avg_duration_ms: f64,
    /// Manager messages per worker message
    pub manager_worker_ratio: f64,
}

/// One of the three performance clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCluster {
    pub label: ClusterLabel,
    pub centroid: Vec<f64>,
    pub sessions: Vec<String>,
    pub avg_score: f64,
    pub characteristics: ClusterCharacteristics,
    pub improvement_areas: Vec<String>,
}

/// Linear trend of session scores over time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrend {
    pub slope: f64,
    pub r_squared: f64,
    pub sessions: usize,
}

/// Session cost distribution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub mean_cost: f64,
    pub std_cost: f64,
    pub total_cost: f64,
    /// Sessions above mean + 2 standard deviations
    pub high_cost_sessions: Vec<String>,
    /// Correlation of cost with session score
    pub cost_success_correlation: f64,
}

/// Everything one insight pass produces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub patterns: CollaborationPatterns,
    pub clusters: Vec<PerformanceCluster>,
    pub trend: Option<ScoreTrend>,
    pub cost: CostAnalysis,
    pub quality: Option<crate::insights::quality::QualityModel>,
}
