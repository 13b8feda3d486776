//! sessionsight - Analytics for dual-agent sessions
//!
//! Turns recorded sessions between two cooperating AI agents into insights,
//! anomalies, forecasts and recommendations.
//!
//! # Architecture
//!
//! - **types / store**: session records and the read-only store seam
//! - **stats / baseline**: shared statistics and the behavioral baseline
//! - **anomaly**: detection, recurrence patterns and early-warning prediction
//! - **insights**: collaboration patterns, clustering, quality indicators
//! - **prediction**: regression models, resource forecasts, capacity planning
//! - **recommendations**: rule-based recommendations and strategy bundles
//! - **service**: lifecycle, cached snapshot, read API and push events

pub mod errors;
pub mod types;
pub mod stats;
pub mod store;

pub mod baseline;
pub mod anomaly;
pub mod insights;
pub mod prediction;
pub mod recommendations;

pub mod events;
pub mod service;

pub mod cli;
pub mod config;
pub mod telemetry;

// Re-export commonly used types
pub use config::AnalyticsConfig;
pub use errors::{AnalyticsError, Result};
pub use events::{AnalyticsEvent, SubscriptionId};
pub use service::{AnalyticsService, AnalyticsSnapshot, ServiceStatus, SessionAnalysis};
pub use store::{DirectorySessionStore, InMemorySessionStore, SessionStore};
