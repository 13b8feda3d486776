//! Baseline calculation
//!
//! Turns a corpus of historical sessions, metrics and communications into a
//! `BaselineMetrics` snapshot (mean and population standard deviation per
//! metric family). A snapshot is replaced wholesale on every recomputation.

pub mod calculator;
pub mod types;

pub use calculator::{BaselineCalculator, MIN_BASELINE_SESSIONS};
pub use types::{
    BaselineMetrics, BehaviorBaseline, CommunicationBaseline, CostBaseline, MetricStats,
    PerformanceBaseline,
};
