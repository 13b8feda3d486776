//! Insights engine
//!
//! Runs every analysis surface over a session set and turns the results into
//! ranked insights. Collaboration patterns and clusters are cached for the
//! most recent session set only; a cache miss only costs recomputation.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::anomaly::{Anomaly, AnomalyPattern, Severity};
use crate::insights::clustering::{cluster_sessions, SessionFeatures};
use crate::insights::collaboration::{analyze_collaboration, exchange_rate, work_distribution};
use crate::insights::quality::QualityModel;
use crate::insights::types::{
    rank_insights, ClusterLabel, CollaborationPatterns, CostAnalysis, Insight, InsightReport,
    InsightType, PerformanceCluster, ScoreTrend,
};
use crate::stats;
use crate::types::metrics::metrics_by_session;
use crate::types::{PerformanceMetric, Session};

/// Sessions needed before a score trend is reported
pub const MIN_TREND_SESSIONS: usize = 5;

/// Slope (score per session) treated as a real trend
const TREND_SLOPE: f64 = 0.01;

/// Holds the result for the last key seen; a new key replaces it
type LatestEntry<V> = Mutex<Option<(String, V)>>;

pub struct InsightsEngine {
    cluster_seed: Option<u64>,
    pattern_cache: LatestEntry<CollaborationPatterns>,
    cluster_cache: LatestEntry<Vec<PerformanceCluster>>,
}

impl InsightsEngine {
    pub fn new(cluster_seed: Option<u64>) -> Self {
        Self {
            cluster_seed,
            pattern_cache: Mutex::new(None),
            cluster_cache: Mutex::new(None),
        }
    }

    /// Run every analysis surface and rank the resulting insights
    pub fn generate_insights(&self, sessions: &[Session], metrics: &[PerformanceMetric]) -> InsightReport {
        let patterns = self.analyze_collaboration_patterns(sessions);
        let clusters = self.performance_cluster_analysis(sessions, metrics);
        let trend = score_trend(sessions);
        let cost = cost_analysis(sessions, metrics);
        let quality = QualityModel::train(sessions);

        let mut insights = Vec::new();
        insights.extend(pattern_insights(&patterns));
        insights.extend(cluster_insights(&clusters));
        insights.extend(trend.as_ref().and_then(trend_insight));
        insights.extend(cost_insights(&cost, sessions.len()));
        insights.extend(quality.as_ref().map(quality_insights).unwrap_or_default());
        rank_insights(&mut insights);

        debug!(
            sessions = sessions.len(),
            insights = insights.len(),
            "generated insights"
        );

        InsightReport {
            insights,
            patterns,
            clusters,
            trend,
            cost,
            quality,
        }
    }

    pub fn analyze_collaboration_patterns(&self, sessions: &[Session]) -> CollaborationPatterns {
        let key = cache_key(sessions);
        if let Some(hit) = cached(&self.pattern_cache, &key) {
            return hit;
        }
        let patterns = analyze_collaboration(sessions);
        *lock(&self.pattern_cache) = Some((key, patterns.clone()));
        patterns
    }

    pub fn performance_cluster_analysis(
        &self,
        sessions: &[Session],
        metrics: &[PerformanceMetric],
    ) -> Vec<PerformanceCluster> {
        let key = cache_key(sessions);
        if let Some(hit) = cached(&self.cluster_cache, &key) {
            return hit;
        }

        let by_session = metrics_by_session(metrics);
        let features: Vec<SessionFeatures> = sessions
            .iter()
            .map(|s| SessionFeatures::extract(s, by_session.get(&s.id)))
            .collect();
        let clusters = cluster_sessions(&features, self.cluster_seed);
        *lock(&self.cluster_cache) = Some((key, clusters.clone()));
        clusters
    }

    /// Targeted insights for one session against reference patterns
    pub fn session_insights(
        &self,
        session: &Session,
        metrics: &[PerformanceMetric],
        reference: Option<&CollaborationPatterns>,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let (Some(rate), Some(optimal)) = (
            exchange_rate(session),
            reference.and_then(|p| p.optimal_exchange_rate),
        ) {
            if (rate - optimal).abs() > 0.5 {
                let direction = if rate > optimal { "more" } else { "less" };
                insights.push(
                    Insight::new(
                        InsightType::Performance,
                        Severity::Medium,
                        "Exchange rate away from optimum",
                        format!(
                            "Agents switch {:.1} times per minute, {} often than the best-performing rate of {:.1}",
                            rate, direction, optimal
                        ),
                        0.7,
                    )
                    .with_data(json!({ "rate": rate, "optimal": optimal }))
                    .with_suggestions(&["Adjust delegation granularity toward the optimal exchange rate"]),
                );
            }
        }

        let distribution = work_distribution(std::slice::from_ref(session));
        if !distribution.balanced && session.message_count() >= 4 {
            insights.push(
                Insight::new(
                    InsightType::Pattern,
                    Severity::Medium,
                    "Unbalanced agent workload",
                    format!(
                        "Manager carries {:.0}% and worker {:.0}% of the messages",
                        distribution.manager_share * 100.0,
                        distribution.worker_share * 100.0
                    ),
                    0.7,
                )
                .with_data(json!({
                    "manager_share": distribution.manager_share,
                    "worker_share": distribution.worker_share,
                }))
                .with_suggestions(&["Rebalance responsibilities between manager and worker"]),
            );
        }

        let total = session.message_count();
        if total > 0 {
            let error_share = session.error_count() as f64 / total as f64;
            if error_share > 0.1 {
                insights.push(
                    Insight::new(
                        InsightType::Performance,
                        Severity::High,
                        "Errors dominating the session",
                        format!("{:.0}% of messages are errors", error_share * 100.0),
                        0.8,
                    )
                    .with_data(json!({
                        "errors": session.error_count(),
                        "messages": total,
                        "cost": session.total_cost(metrics),
                    }))
                    .with_suggestions(&[
                        "Inspect the first failing step",
                        "Provide the worker with missing context or tools",
                    ]),
                );
            }
        }

        rank_insights(&mut insights);
        insights
    }

    pub fn clear_cache(&self) {
        *lock(&self.pattern_cache) = None;
        *lock(&self.cluster_cache) = None;
    }

    /// Cached (pattern, cluster) entry counts
    pub fn cache_sizes(&self) -> (usize, usize) {
        (
            usize::from(lock(&self.pattern_cache).is_some()),
            usize::from(lock(&self.cluster_cache).is_some()),
        )
    }
}

impl Default for InsightsEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Insights derived from anomaly history and recurring patterns
pub fn anomaly_insights(anomalies: &[Anomaly], patterns: &[AnomalyPattern]) -> Vec<Insight> {
    let mut insights: Vec<Insight> = patterns
        .iter()
        .filter(|p| p.is_recurring)
        .map(|p| {
            Insight::new(
                InsightType::Anomaly,
                p.severity,
                format!("Recurring {} anomaly: {}", p.anomaly_type, p.title),
                format!(
                    "Seen {} times across {} sessions ({:.2} per day)",
                    p.occurrences,
                    p.affected_sessions.len(),
                    p.frequency
                ),
                (0.5 + 0.1 * p.occurrences as f64).min(0.95),
            )
            .with_data(json!({
                "pattern_id": p.id,
                "occurrences": p.occurrences,
                "affected_sessions": p.affected_sessions,
            }))
            .with_suggestions(&["Address the root cause shared by the affected sessions"])
        })
        .collect();

    let mut serious: BTreeMap<String, Vec<&Anomaly>> = BTreeMap::new();
    for anomaly in anomalies.iter().filter(|a| a.severity >= Severity::High) {
        serious.entry(anomaly.anomaly_type.to_string()).or_default().push(anomaly);
    }
    for (anomaly_type, group) in serious {
        let severity = group.iter().map(|a| a.severity).max().unwrap_or(Severity::High);
        let sessions: Vec<&str> = group.iter().filter_map(|a| a.session_id.as_deref()).collect();
        insights.push(
            Insight::new(
                InsightType::Anomaly,
                severity,
                format!("{} high-severity {} anomalies", group.len(), anomaly_type),
                format!("Detected across {} sessions", sessions.len()),
                0.8,
            )
            .with_data(json!({ "sessions": sessions }))
            .with_suggestions(&["Review the affected sessions for a shared cause"]),
        );
    }

    rank_insights(&mut insights);
    insights
}

fn pattern_insights(patterns: &CollaborationPatterns) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(rate) = patterns.optimal_exchange_rate {
        let bucket = patterns.exchange_rates.iter().find(|b| b.rate == rate);
        insights.push(
            Insight::new(
                InsightType::Performance,
                Severity::Medium,
                "Optimal agent exchange rate",
                format!(
                    "Sessions switching agents about {:.1} times per minute have the best outcomes",
                    rate
                ),
                0.85,
            )
            .with_data(json!({
                "rate": rate,
                "avg_success": bucket.map(|b| b.avg_success),
                "sessions": bucket.map(|b| b.sessions),
            }))
            .with_suggestions(&[
                "Tune delegation granularity toward this exchange rate",
                "Flag sessions that drift far from it",
            ]),
        );
    }

    let distribution = &patterns.work_distribution;
    if !distribution.balanced && patterns.sessions_analyzed > 0 {
        insights.push(
            Insight::new(
                InsightType::Pattern,
                Severity::Medium,
                "Unbalanced work distribution",
                format!(
                    "Manager {:.0}% / worker {:.0}% of messages",
                    distribution.manager_share * 100.0,
                    distribution.worker_share * 100.0
                ),
                0.75,
            )
            .with_data(json!({
                "manager_share": distribution.manager_share,
                "worker_share": distribution.worker_share,
            }))
            .with_suggestions(&["Move routine work from the busier agent to the other"]),
        );
    } else if let Some(top) = patterns.sequences.first() {
        insights.push(
            Insight::new(
                InsightType::Pattern,
                Severity::Low,
                "Successful collaboration sequence",
                format!(
                    "Sequence {} appears in {} sessions with {:.0}% success",
                    top.pattern,
                    top.occurrences,
                    top.success_rate * 100.0
                ),
                0.7,
            )
            .with_data(json!({ "pattern": top.pattern, "occurrences": top.occurrences }))
            .with_suggestions(&["Use this sequence as the default collaboration template"]),
        );
    }

    insights
}

fn cluster_insights(clusters: &[PerformanceCluster]) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some(under) = clusters
        .iter()
        .find(|c| c.label == ClusterLabel::UnderPerformers && !c.sessions.is_empty())
    {
        if !under.improvement_areas.is_empty() {
            insights.push(
                Insight::new(
                    InsightType::Performance,
                    Severity::High,
                    "Underperforming session cluster",
                    format!(
                        "{} sessions average a score of {:.2}",
                        under.sessions.len(),
                        under.avg_score
                    ),
                    0.8,
                )
                .with_data(json!({
                    "sessions": under.sessions,
                    "improvement_areas": under.improvement_areas,
                }))
                .with_suggestions(&["Work through the cluster's improvement areas in order"]),
            );
        }
    }

    if let Some(high) = clusters
        .iter()
        .find(|c| c.label == ClusterLabel::HighPerformers && !c.sessions.is_empty())
    {
        insights.push(
            Insight::new(
                InsightType::Pattern,
                Severity::Low,
                "High-performer characteristics",
                format!(
                    "{} sessions average {:.0} messages and {:.0}ms responses",
                    high.sessions.len(),
                    high.characteristics.avg_messages,
                    high.characteristics.avg_response_ms
                ),
                0.75,
            )
            .with_data(serde_json::to_value(&high.characteristics).unwrap_or_default())
            .with_suggestions(&["Replicate the high performers' setup in other sessions"]),
        );
    }

    insights
}

fn score_trend(sessions: &[Session]) -> Option<ScoreTrend> {
    if sessions.len() < MIN_TREND_SESSIONS {
        return None;
    }
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.start_time);
    let xs: Vec<f64> = (0..ordered.len()).map(|i| i as f64).collect();
    let ys: Vec<f64> = ordered.iter().map(|s| s.success_score()).collect();
    let fit = stats::linear_regression(&xs, &ys);
    Some(ScoreTrend {
        slope: fit.slope,
        r_squared: fit.r_squared,
        sessions: ordered.len(),
    })
}

fn trend_insight(trend: &ScoreTrend) -> Option<Insight> {
    let confidence = trend.r_squared.clamp(0.3, 0.9);
    if trend.slope < -TREND_SLOPE {
        let severity = if trend.slope < -0.05 { Severity::High } else { Severity::Medium };
        Some(
            Insight::new(
                InsightType::Trend,
                severity,
                "Session outcomes are declining",
                format!("Success score falls by {:.3} per session", -trend.slope),
                confidence,
            )
            .with_data(json!({ "slope": trend.slope, "r_squared": trend.r_squared }))
            .with_suggestions(&["Compare recent sessions with earlier successful ones"]),
        )
    } else if trend.slope > TREND_SLOPE {
        Some(
            Insight::new(
                InsightType::Trend,
                Severity::Low,
                "Session outcomes are improving",
                format!("Success score rises by {:.3} per session", trend.slope),
                confidence,
            )
            .with_data(json!({ "slope": trend.slope, "r_squared": trend.r_squared })),
        )
    } else {
        None
    }
}

fn cost_analysis(sessions: &[Session], metrics: &[PerformanceMetric]) -> CostAnalysis {
    if sessions.is_empty() {
        return CostAnalysis::default();
    }
    let by_session = metrics_by_session(metrics);
    let costs: Vec<f64> = sessions
        .iter()
        .map(|s| s.total_cost(by_session.get(&s.id)))
        .collect();
    let scores: Vec<f64> = sessions.iter().map(Session::success_score).collect();

    let mean_cost = stats::mean(&costs);
    let std_cost = stats::std_dev(&costs);
    let limit = mean_cost + 2.0 * std_cost;
    let high_cost_sessions = sessions
        .iter()
        .zip(&costs)
        .filter(|(_, c)| std_cost > 0.0 && **c > limit)
        .map(|(s, _)| s.id.clone())
        .collect();

    CostAnalysis {
        mean_cost,
        std_cost,
        total_cost: costs.iter().sum(),
        high_cost_sessions,
        cost_success_correlation: stats::correlation(&costs, &scores),
    }
}

fn cost_insights(cost: &CostAnalysis, total_sessions: usize) -> Vec<Insight> {
    let mut insights = Vec::new();

    if !cost.high_cost_sessions.is_empty() {
        let share = cost.high_cost_sessions.len() as f64 / total_sessions.max(1) as f64;
        let severity = if share > 0.2 { Severity::High } else { Severity::Medium };
        insights.push(
            Insight::new(
                InsightType::Cost,
                severity,
                "High-cost sessions detected",
                format!(
                    "{} sessions cost more than ${:.2} (mean ${:.2})",
                    cost.high_cost_sessions.len(),
                    cost.mean_cost + 2.0 * cost.std_cost,
                    cost.mean_cost
                ),
                0.8,
            )
            .with_data(json!({ "sessions": cost.high_cost_sessions, "mean_cost": cost.mean_cost }))
            .with_suggestions(&["Set per-session budget limits", "Review context size in the costliest sessions"]),
        );
    }

    if cost.cost_success_correlation <= -0.3 {
        insights.push(
            Insight::new(
                InsightType::Cost,
                Severity::Medium,
                "Higher spend is not improving outcomes",
                format!(
                    "Cost and success are negatively correlated (r={:.2})",
                    cost.cost_success_correlation
                ),
                0.7,
            )
            .with_data(json!({ "correlation": cost.cost_success_correlation }))
            .with_suggestions(&["Stop sessions early once they exceed the typical cost of a success"]),
        );
    }

    insights
}

fn quality_insights(model: &QualityModel) -> Vec<Insight> {
    let mut insights = Vec::new();

    if model.accuracy >= 0.6 {
        insights.push(
            Insight::new(
                InsightType::Performance,
                Severity::Low,
                "Early indicators predict session quality",
                format!(
                    "The first messages predict outcomes with {:.0}% accuracy over {} sessions",
                    model.accuracy * 100.0,
                    model.training_sessions
                ),
                model.accuracy.min(0.95),
            )
            .with_data(json!({ "thresholds": model.thresholds, "accuracy": model.accuracy }))
            .with_suggestions(&["Check early indicators before committing to long sessions"]),
        );
    }

    if model.predicted_failure_rate > model.observed_failure_rate {
        insights.push(
            Insight::new(
                InsightType::Performance,
                Severity::High,
                "At-risk session pattern",
                format!(
                    "Early indicators flag {:.0}% of sessions while {:.0}% actually failed",
                    model.predicted_failure_rate * 100.0,
                    model.observed_failure_rate * 100.0
                ),
                0.7,
            )
            .with_data(json!({
                "predicted_failure_rate": model.predicted_failure_rate,
                "observed_failure_rate": model.observed_failure_rate,
            }))
            .with_suggestions(&["Intervene early in sessions that trip two or more indicators"]),
        );
    }

    insights
}

/// Cache key: sorted session ids with their message counts
fn cache_key(sessions: &[Session]) -> String {
    let mut parts: Vec<String> = sessions
        .iter()
        .map(|s| format!("{}:{}", s.id, s.message_count()))
        .collect();
    parts.sort();
    parts.join(",")
}

fn cached<V: Clone>(cache: &LatestEntry<V>, key: &str) -> Option<V> {
    lock(cache)
        .as_ref()
        .filter(|(cached_key, _)| cached_key == key)
        .map(|(_, value)| value.clone())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyMetrics, AnomalyType};
    use crate::types::{AgentRole, Message, MessageKind, SessionStatus};
    use chrono::{Duration, Utc};

    fn session(i: usize, success: bool) -> Session {
        let id = format!("s{}", i);
        let start = Utc::now() - Duration::days(20) + Duration::hours(i as i64 * 6);
        let mut s = Session::new(id.as_str(), "task").starting_at(start);
        for j in 0..6 {
            let role = if j % 2 == 0 { AgentRole::Manager } else { AgentRole::Worker };
            s.append_message(
                Message::new(id.as_str(), role, MessageKind::Response, "ok")
                    .at(start + Duration::seconds(j as i64 * 40))
                    .with_duration(1000.0 + 100.0 * i as f64)
                    .with_cost(0.1),
            );
        }
        let status = if success { SessionStatus::Completed } else { SessionStatus::Failed };
        s.finish(status, start + Duration::minutes(5));
        s
    }

    #[test]
    fn test_generate_insights_is_ranked() {
        let sessions: Vec<Session> = (0..12).map(|i| session(i, i % 4 != 0)).collect();
        let engine = InsightsEngine::new(Some(3));
        let report = engine.generate_insights(&sessions, &[]);

        assert_eq!(report.clusters.len(), 3);
        assert!(report.patterns.optimal_exchange_rate.is_some());
        assert!(report
            .insights
            .iter()
            .any(|i| i.title == "Optimal agent exchange rate" && i.confidence == 0.85));
        let scores: Vec<f64> = report.insights.iter().map(Insight::rank_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_declining_trend_detected() {
        let sessions: Vec<Session> = (0..8).map(|i| session(i, i < 4)).collect();
        let trend = score_trend(&sessions).unwrap();
        assert!(trend.slope < -TREND_SLOPE);
        let insight = trend_insight(&trend).unwrap();
        assert_eq!(insight.insight_type, InsightType::Trend);
        assert_eq!(insight.severity, Severity::High);

        assert!(score_trend(&sessions[..4]).is_none());
    }

    #[test]
    fn test_cache_reused_for_same_session_set() {
        let sessions: Vec<Session> = (0..6).map(|i| session(i, true)).collect();
        let engine = InsightsEngine::default();
        let first = engine.performance_cluster_analysis(&sessions, &[]);
        let mut reversed = sessions.clone();
        reversed.reverse();
        let second = engine.performance_cluster_analysis(&reversed, &[]);
        assert_eq!(first, second);
        assert_eq!(engine.cache_sizes().1, 1);

        engine.clear_cache();
        assert_eq!(engine.cache_sizes(), (0, 0));
    }

    #[test]
    fn test_cache_holds_only_latest_session_set() {
        let engine = InsightsEngine::new(Some(5));
        let mut sessions = Vec::new();
        for i in 0..50 {
            sessions.push(session(i, i % 3 != 0));
            engine.generate_insights(&sessions, &[]);
        }
        assert_eq!(engine.cache_sizes(), (1, 1));

        // The surviving entry still serves the latest set
        let again = engine.performance_cluster_analysis(&sessions, &[]);
        assert_eq!(again, engine.generate_insights(&sessions, &[]).clusters);

        engine.performance_cluster_analysis(&sessions[..10], &[]);
        assert_eq!(engine.cache_sizes(), (1, 1));
    }

    #[test]
    fn test_session_insights_flag_errors() {
        let mut s = session(1, false);
        for m in s.messages.iter_mut().take(2) {
            m.kind = MessageKind::Error;
        }
        let insights = InsightsEngine::default().session_insights(&s, &[], None);
        assert_eq!(insights[0].title, "Errors dominating the session");
    }

    #[test]
    fn test_anomaly_insights() {
        let metrics = AnomalyMetrics {
            actual_value: 1.0,
            expected_value: 0.0,
            deviation_score: 5.0,
            confidence_level: 0.9,
        };
        let anomalies = vec![
            Anomaly::new(AnomalyType::Cost, Severity::Critical, "Excessive token usage", "", metrics.clone()).for_session("a"),
            Anomaly::new(AnomalyType::Cost, Severity::High, "Excessive token usage", "", metrics.clone()).for_session("b"),
            Anomaly::new(AnomalyType::Behavior, Severity::Low, "Unusually short session", "", metrics),
        ];
        let insights = anomaly_insights(&anomalies, &[]);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].severity, Severity::Critical);
        assert_eq!(insights[0].title, "2 high-severity cost anomalies");
    }
}
