//! Optimization recommendations
//!
//! Turns insights, clusters and anomaly patterns into prioritized
//! recommendations, each with evidence and a monitoring plan, and bundles
//! them into strategies.

pub mod generator;
pub mod strategies;
pub mod types;

pub use generator::{generate_recommendations, RecommendationInput};
pub use strategies::{build_strategies, combined_impact};
pub use types::{
    rank_recommendations, CombinedImpact, Difficulty, Evidence, ExpectedImpact,
    ImplementationPlan, MonitoringPlan, Priority, Recommendation, RecommendationCategory, Strategy,
};
