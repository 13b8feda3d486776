//! Telemetry for the analytics service
//!
//! `init_tracing` wires up the log subscriber for the binary.
//! `AnalyticsTelemetry` counts service events in-process for `get_status`.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Events kept for `recent_events`
const EVENT_CAPACITY: usize = 256;

/// Install a stderr fmt subscriber; `RUST_LOG` overrides the verbosity default
///
/// Verbosity 0 is warnings only, 1 info, 2 debug, 3+ trace. Safe to call
/// more than once; later calls are ignored.
pub fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "sessionsight=info",
        2 => "sessionsight=debug",
        _ => "sessionsight=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Service events worth counting
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    AnalysisCompleted {
        duration_ms: u64,
        sessions: usize,
        timestamp: Instant,
    },
    /// A full analysis fired while another was still running
    AnalysisSkipped {
        timestamp: Instant,
    },
    SessionAnalyzed {
        session_id: String,
        anomalies: usize,
        timestamp: Instant,
    },
    AnomalyPublished {
        delivered: usize,
        failed: usize,
        timestamp: Instant,
    },
    ModelsRetrained {
        models: usize,
        timestamp: Instant,
    },
    LoadFailed {
        session_id: String,
        timestamp: Instant,
    },
}

/// Aggregated counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub analyses_completed: usize,
    pub analyses_skipped: usize,
    pub last_analysis_ms: Option<u64>,
    pub sessions_analyzed: usize,
    pub anomalies_published: usize,
    pub subscriber_failures: usize,
    pub model_retrains: usize,
    pub load_failures: usize,
}

/// Cloneable in-process collector; clones share state
#[derive(Clone)]
pub struct AnalyticsTelemetry {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

impl AnalyticsTelemetry {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::AnalysisCompleted { duration_ms, .. } => {
                    stats.analyses_completed += 1;
                    stats.last_analysis_ms = Some(*duration_ms);
                }
                TelemetryEvent::AnalysisSkipped { .. } => stats.analyses_skipped += 1,
                TelemetryEvent::SessionAnalyzed { .. } => stats.sessions_analyzed += 1,
                TelemetryEvent::AnomalyPublished { failed, .. } => {
                    stats.anomalies_published += 1;
                    stats.subscriber_failures += failed;
                }
                TelemetryEvent::ModelsRetrained { .. } => stats.model_retrains += 1,
                TelemetryEvent::LoadFailed { .. } => stats.load_failures += 1,
            }
        }

        let mut events = lock(&self.events);
        if events.len() == EVENT_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Last `n` events, oldest first
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    pub fn reset(&self) {
        lock(&self.events).clear();
        *lock(&self.stats) = TelemetryStats::default();
    }
}

impl Default for AnalyticsTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
