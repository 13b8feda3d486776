//! Recommendation type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::anomaly::Severity;

/// Recommendation priority, on the same four-tier scale as severity
pub type Priority = Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Performance,
    Cost,
    Efficiency,
    Quality,
    Reliability,
}

impl fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendationCategory::Performance => write!(f, "performance"),
            RecommendationCategory::Cost => write!(f, "cost"),
            RecommendationCategory::Efficiency => write!(f, "efficiency"),
            RecommendationCategory::Quality => write!(f, "quality"),
            RecommendationCategory::Reliability => write!(f, "reliability"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Expected effect of acting on a recommendation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedImpact {
    /// Percent improvement in session outcomes
    pub performance_gain: f64,
    /// Currency saved per analysis window
    pub cost_savings: f64,
    /// Percent reduction in session duration
    pub time_reduction: f64,
    /// Percent reduction in errors
    pub error_reduction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub steps: Vec<String>,
}

/// Data backing a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub data_points: usize,
    /// Always within [0, 1]
    pub confidence: f64,
    pub affected_sessions: Vec<String>,
}

impl Evidence {
    pub fn new(data_points: usize, confidence: f64, affected_sessions: Vec<String>) -> Self {
        Self {
            data_points,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            affected_sessions,
        }
    }
}

/// How to tell whether a recommendation worked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringPlan {
    pub metrics: Vec<String>,
    pub success_criteria: Vec<String>,
    pub timeframe: String,
}

impl MonitoringPlan {
    pub fn new(metrics: &[&str], success_criteria: &[&str], timeframe: &str) -> Self {
        Self {
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            success_criteria: success_criteria.iter().map(|c| c.to_string()).collect(),
            timeframe: timeframe.to_string(),
        }
    }
}

/// An actionable, impact-scored suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub impact: ExpectedImpact,
    pub implementation: ImplementationPlan,
    pub evidence: Evidence,
    pub monitoring: MonitoringPlan,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    /// Build a recommendation; evidence and monitoring are mandatory
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        category: RecommendationCategory,
        priority: Priority,
        title: impl Into<String>,
        description: impl Into<String>,
        impact: ExpectedImpact,
        implementation: ImplementationPlan,
        evidence: Evidence,
        monitoring: MonitoringPlan,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            priority,
            title: title.into(),
            description: description.into(),
            impact,
            implementation,
            evidence,
            monitoring,
            created_at: Utc::now(),
        }
    }

    /// Ranking key: priority weight x evidence confidence
    pub fn rank_score(&self) -> f64 {
        self.priority.weight() * self.evidence.confidence
    }
}

/// Highest priority first, then strongest evidence
pub fn rank_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then(
            b.evidence
                .confidence
                .partial_cmp(&a.evidence.confidence)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
}

/// Summed impact of a strategy's recommendations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedImpact {
    pub performance_gain: f64,
    pub cost_savings: f64,
    pub implementation_hours: f64,
}

/// Named bundle of recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    pub recommendations: Vec<Recommendation>,
    pub combined: CombinedImpact,
}
