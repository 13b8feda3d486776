//! Orchestrating analytics service
//!
//! Owns the lifecycle, the cached analysis snapshot, the read API and the
//! push notifications.

pub mod filters;
pub mod orchestrator;
pub mod snapshot;

pub use filters::{AnomalyFilter, InsightFilter, RecommendationFilter};
pub use orchestrator::AnalyticsService;
pub use snapshot::{AnalyticsSnapshot, ComponentHealth, ServiceStatus, SessionAnalysis};
