//! Baseline snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats;

/// Mean and population standard deviation of one metric series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl MetricStats {
    pub fn from_values(values: &[f64]) -> Self {
        Self {
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            samples: values.len(),
        }
    }

    /// Absolute z-score of `actual`; 0.0 when the series has no spread
    pub fn z_score(&self, actual: f64) -> f64 {
        stats::z_score(actual, self.mean, self.std_dev)
    }

    pub fn has_samples(&self) -> bool {
        self.samples > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    /// Response time in milliseconds, across all metrics
    pub response_time: MetricStats,
    /// Success rate across sessions with a summary
    pub success_rate: MetricStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBaseline {
    pub session_cost: MetricStats,
    pub tokens_per_message: MetricStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorBaseline {
    pub messages_per_session: MetricStats,
    pub agent_switches: MetricStats,
    pub tool_calls: MetricStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationBaseline {
    /// Handoff latency in milliseconds
    pub handoff_time: MetricStats,
    pub coordination_score: MetricStats,
}

/// Point-in-time statistical snapshot of the historical corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    pub performance: PerformanceBaseline,
    pub cost: CostBaseline,
    pub behavior: BehaviorBaseline,
    pub communication: CommunicationBaseline,
    /// Number of historical sessions the snapshot was computed from
    pub session_count: usize,
    pub computed_at: DateTime<Utc>,
}

impl BaselineMetrics {
    /// An all-zero snapshot, used before any history exists
    pub fn empty() -> Self {
        Self {
            performance: PerformanceBaseline::default(),
            cost: CostBaseline::default(),
            behavior: BehaviorBaseline::default(),
            communication: CommunicationBaseline::default(),
            session_count: 0,
            computed_at: Utc::now(),
        }
    }

    /// Whether enough sessions backed the snapshot for deviation scoring
    pub fn is_meaningful(&self) -> bool {
        self.session_count >= super::MIN_BASELINE_SESSIONS
    }
}
