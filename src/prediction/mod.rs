//! Predictive analytics
//!
//! Regression models for session quality, cost and duration, multi-day
//! resource forecasts, trend analysis and hourly capacity planning.

pub mod capacity;
pub mod forecast;
pub mod models;
pub mod outcome;
pub mod trends;
pub mod types;

pub use capacity::{forecast_load, hourly_profile};
pub use forecast::{daily_buckets, forecast_resources, weekly_seasonality};
pub use models::{early_features, fit_model, PredictiveModels, MIN_TRAINING_EXAMPLES};
pub use outcome::{predict_outcome, MIN_OUTCOME_MESSAGES};
pub use trends::{analyze_resource_trends, analyze_trend, change_points};
pub use types::*;
