//! Insights engine
//!
//! Collaboration pattern analysis, k=3 performance clustering, score trends,
//! cost patterns and early-indicator quality prediction, emitted as ranked
//! `Insight`s.

pub mod clustering;
pub mod collaboration;
pub mod engine;
pub mod quality;
pub mod types;

pub use clustering::{cluster_sessions, SessionFeatures, CLUSTER_COUNT};
pub use collaboration::analyze_collaboration;
pub use engine::{anomaly_insights, InsightsEngine};
pub use quality::QualityModel;
pub use types::{
    rank_insights, ClusterCharacteristics, ClusterLabel, CollaborationPatterns, CostAnalysis,
    Insight, InsightReport, InsightType, PerformanceCluster, ScoreTrend, SequencePattern,
    WorkDistribution,
};
