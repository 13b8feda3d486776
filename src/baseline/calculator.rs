//! Baseline calculator
//!
//! Partitions historical values per metric family and computes mean and
//! population standard deviation for each series.

use chrono::Utc;
use tracing::debug;

use crate::baseline::types::{
    BaselineMetrics, BehaviorBaseline, CommunicationBaseline, CostBaseline, MetricStats,
    PerformanceBaseline,
};
use crate::types::metrics::{
    communications_by_session, coordination_score, handoff_latencies, metrics_by_session,
};
use crate::types::{AgentCommunication, Message, PerformanceMetric, Session};

/// Minimum historical sessions for a baseline to be used for detection
pub const MIN_BASELINE_SESSIONS: usize = 10;

/// Computes `BaselineMetrics` snapshots from the historical corpus
#[derive(Debug, Clone, Default)]
pub struct BaselineCalculator;

impl BaselineCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Compute a fresh snapshot
    ///
    /// Always succeeds; with fewer than `MIN_BASELINE_SESSIONS` sessions the
    /// result reports `is_meaningful() == false` and callers skip detection.
    pub fn calculate(
        &self,
        sessions: &[Session],
        metrics: &[PerformanceMetric],
        communications: &[AgentCommunication],
    ) -> BaselineMetrics {
        let metrics_by_session = metrics_by_session(metrics);
        let comms_by_session = communications_by_session(communications);

        let mut response_times: Vec<f64> = metrics.iter().map(|m| m.response_time_ms).collect();
        let mut success_rates = Vec::new();
        let mut session_costs = Vec::new();
        let mut tokens_per_message = Vec::new();
        let mut message_counts = Vec::new();
        let mut switches = Vec::new();
        let mut tool_calls = Vec::new();
        let mut handoffs = Vec::new();
        let mut coordination = Vec::new();

        for session in sessions {
            let session_metrics = metrics_by_session.get(&session.id);

            // Sessions recorded without metrics still contribute message timings
            if session_metrics.is_empty() {
                response_times.extend(session.messages.iter().filter_map(Message::duration_ms));
            }

            if let Some(rate) = session.success_rate() {
                success_rates.push(rate);
            }

            let cost = session.total_cost(session_metrics);
            if cost > 0.0 || session.summary.is_some() {
                session_costs.push(cost);
            }

            let message_count = session.message_count();
            let tokens = session.total_tokens(session_metrics);
            if message_count > 0 && tokens > 0 {
                tokens_per_message.push(tokens as f64 / message_count as f64);
            }

            message_counts.push(message_count as f64);
            switches.push(session.agent_switches() as f64);
            tool_calls.push(session.tool_call_count() as f64);

            let comms = comms_by_session.get(&session.id);
            handoffs.extend(handoff_latencies(comms));
            if let Some(score) = coordination_score(comms) {
                coordination.push(score);
            }
        }

        let baseline = BaselineMetrics {
            performance: PerformanceBaseline {
                response_time: MetricStats::from_values(&response_times),
                success_rate: MetricStats::from_values(&success_rates),
            },
            cost: CostBaseline {
                session_cost: MetricStats::from_values(&session_costs),
                tokens_per_message: MetricStats::from_values(&tokens_per_message),
            },
            behavior: BehaviorBaseline {
                messages_per_session: MetricStats::from_values(&message_counts),
                agent_switches: MetricStats::from_values(&switches),
                tool_calls: MetricStats::from_values(&tool_calls),
            },
            communication: CommunicationBaseline {
                handoff_time: MetricStats::from_values(&handoffs),
                coordination_score: MetricStats::from_values(&coordination),
            },
            session_count: sessions.len(),
            computed_at: Utc::now(),
        };

        debug!(
            sessions = baseline.session_count,
            meaningful = baseline.is_meaningful(),
            response_mean = baseline.performance.response_time.mean,
            "computed baseline"
        );

        baseline
    }
}
