//! Recommendation generation
//!
//! A pure function of an insight report, the recurring anomaly patterns and
//! the session corpus. Each rule emits at most one recommendation.

use crate::anomaly::{AnomalyPattern, Severity};
use crate::insights::collaboration::exchange_rate;
use crate::insights::{ClusterLabel, InsightReport, InsightType};
use crate::recommendations::types::{
    rank_recommendations, Difficulty, Evidence, ExpectedImpact, ImplementationPlan, MonitoringPlan,
    Recommendation, RecommendationCategory,
};
use crate::stats;
use crate::types::metrics::metrics_by_session;
use crate::types::{BySession, PerformanceMetric, Session};

/// Average response time above which a reduction is recommended
pub const SLOW_RESPONSE_MS: f64 = 5_000.0;

/// Tokens per message above which token optimization is recommended
pub const TOKEN_HEAVY_PER_MESSAGE: f64 = 1_000.0;

/// Tool invocations per message above which tool usage is reviewed
pub const TOOL_HEAVY_PER_MESSAGE: f64 = 0.5;

/// Score gap between high and under performers worth replicating
const REPLICATION_GAP: f64 = 0.2;

/// Distance from the optimal exchange rate that counts as off-target
const EXCHANGE_RATE_TOLERANCE: f64 = 0.5;

/// Everything recommendations are derived from
pub struct RecommendationInput<'a> {
    pub report: &'a InsightReport,
    pub anomaly_patterns: &'a [AnomalyPattern],
    pub sessions: &'a [Session],
    pub metrics: &'a [PerformanceMetric],
}

/// Generate and rank recommendations across all five categories
pub fn generate_recommendations(input: &RecommendationInput<'_>) -> Vec<Recommendation> {
    let by_session = metrics_by_session(input.metrics);

    let mut recommendations: Vec<Recommendation> = [
        exchange_rate_tuning(input),
        response_time_reduction(input, &by_session),
        high_performer_replication(input),
        high_cost_mitigation(input),
        token_optimization(input, &by_session),
        work_rebalancing(input),
        tool_usage_optimization(input),
        predictive_quality(input),
        underperformer_remediation(input),
        critical_error_fixes(input),
        anomaly_alerting(input),
    ]
    .into_iter()
    .flatten()
    .collect();

    rank_recommendations(&mut recommendations);
    recommendations
}

fn plan(difficulty: Difficulty, hours: f64, steps: &[&str]) -> ImplementationPlan {
    ImplementationPlan {
        difficulty,
        estimated_hours: hours,
        steps: steps.iter().map(|s| s.to_string()).collect(),
    }
}

fn exchange_rate_tuning(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let patterns = &input.report.patterns;
    let optimal = patterns.optimal_exchange_rate?;
    if patterns.exchange_rates.len() < 2 {
        return None;
    }
    let affected: Vec<String> = input
        .sessions
        .iter()
        .filter(|s| exchange_rate(s).is_some_and(|r| (r - optimal).abs() > EXCHANGE_RATE_TOLERANCE))
        .map(|s| s.id.clone())
        .collect();
    if affected.is_empty() {
        return None;
    }

    let best = patterns
        .exchange_rates
        .iter()
        .map(|b| b.avg_success)
        .fold(0.0, f64::max);
    let overall = stats::mean(&patterns.exchange_rates.iter().map(|b| b.avg_success).collect::<Vec<_>>());

    Some(Recommendation::new(
        RecommendationCategory::Performance,
        Severity::Medium,
        format!("Tune agent exchange rate toward {:.1} switches/min", optimal),
        format!(
            "{} sessions run away from the best-performing exchange rate",
            affected.len()
        ),
        ExpectedImpact {
            performance_gain: ((best - overall).max(0.0) * 100.0).min(50.0),
            time_reduction: 5.0,
            ..Default::default()
        },
        plan(
            Difficulty::Easy,
            4.0,
            &[
                "Adjust manager check-in frequency in the orchestration prompt",
                "Cap consecutive messages per agent before a handoff",
            ],
        ),
        Evidence::new(patterns.sessions_analyzed, 0.8, affected),
        MonitoringPlan::new(
            &["exchange_rate", "success_rate"],
            &[&*format!("Median exchange rate within {:.1} of {:.1}", EXCHANGE_RATE_TOLERANCE, optimal)],
            "2 weeks",
        ),
    ))
}

fn response_time_reduction(
    input: &RecommendationInput<'_>,
    by_session: &BySession<'_, PerformanceMetric>,
) -> Option<Recommendation> {
    let timed: Vec<(&Session, f64)> = input
        .sessions
        .iter()
        .filter_map(|s| s.avg_response_time(by_session.get(&s.id)).map(|rt| (s, rt)))
        .collect();
    if timed.is_empty() {
        return None;
    }
    let mean = stats::mean(&timed.iter().map(|(_, rt)| *rt).collect::<Vec<_>>());
    if mean <= SLOW_RESPONSE_MS {
        return None;
    }
    let affected: Vec<String> = timed
        .iter()
        .filter(|(_, rt)| *rt > SLOW_RESPONSE_MS)
        .map(|(s, _)| s.id.clone())
        .collect();

    Some(Recommendation::new(
        RecommendationCategory::Performance,
        if mean > 2.0 * SLOW_RESPONSE_MS { Severity::High } else { Severity::Medium },
        "Reduce agent response time",
        format!("Average response time is {:.0} ms across {} sessions", mean, timed.len()),
        ExpectedImpact {
            performance_gain: 10.0,
            time_reduction: ((1.0 - SLOW_RESPONSE_MS / mean) * 100.0).clamp(0.0, 60.0),
            ..Default::default()
        },
        plan(
            Difficulty::Medium,
            16.0,
            &[
                "Profile the slowest turns and their prompts",
                "Trim context passed on each turn",
                "Use a faster model for routine worker steps",
            ],
        ),
        Evidence::new(timed.len(), (affected.len() as f64 / timed.len() as f64).max(0.5), affected),
        MonitoringPlan::new(
            &["avg_response_time_ms"],
            &[&*format!("Average response time below {:.0} ms", SLOW_RESPONSE_MS)],
            "2 weeks",
        ),
    ))
}

fn high_performer_replication(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let clusters = &input.report.clusters;
    let high = clusters
        .iter()
        .find(|c| c.label == ClusterLabel::HighPerformers && !c.sessions.is_empty())?;
    let under = clusters
        .iter()
        .find(|c| c.label == ClusterLabel::UnderPerformers && !c.sessions.is_empty())?;
    let gap = high.avg_score - under.avg_score;
    if gap <= REPLICATION_GAP {
        return None;
    }

    Some(Recommendation::new(
        RecommendationCategory::Performance,
        Severity::High,
        "Replicate high-performer practices",
        format!(
            "High performers average {:.2} against {:.2} for under-performers",
            high.avg_score, under.avg_score
        ),
        ExpectedImpact {
            performance_gain: (gap * 50.0).min(40.0),
            error_reduction: 15.0,
            ..Default::default()
        },
        plan(
            Difficulty::Medium,
            12.0,
            &[
                "Compare prompts and tool setups of the two clusters",
                "Template the high-performer task framing",
                "Roll the template out to new sessions",
            ],
        ),
        Evidence::new(high.sessions.len() + under.sessions.len(), 0.75, under.sessions.clone()),
        MonitoringPlan::new(
            &["cluster_avg_score", "success_rate"],
            &["Under-performer cluster average score rises by 0.1"],
            "1 month",
        ),
    ))
}

fn high_cost_mitigation(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let cost = &input.report.cost;
    if cost.high_cost_sessions.is_empty() {
        return None;
    }
    let threshold = cost.mean_cost + 2.0 * cost.std_cost;
    let savings = cost.high_cost_sessions.len() as f64 * (threshold - cost.mean_cost).max(0.0);

    Some(Recommendation::new(
        RecommendationCategory::Cost,
        Severity::High,
        "Cap spend on outlier sessions",
        format!(
            "{} sessions cost more than ${:.2}",
            cost.high_cost_sessions.len(),
            threshold
        ),
        ExpectedImpact {
            cost_savings: savings,
            ..Default::default()
        },
        plan(
            Difficulty::Easy,
            3.0,
            &["Set a per-session spending limit", "Alert when a session crosses the limit"],
        ),
        Evidence::new(input.sessions.len(), 0.85, cost.high_cost_sessions.clone()),
        MonitoringPlan::new(
            &["session_cost", "high_cost_sessions"],
            &[&*format!("No session above ${:.2}", threshold)],
            "2 weeks",
        ),
    ))
}

fn token_optimization(
    input: &RecommendationInput<'_>,
    by_session: &BySession<'_, PerformanceMetric>,
) -> Option<Recommendation> {
    let per_message: Vec<(&Session, f64)> = input
        .sessions
        .iter()
        .filter(|s| s.message_count() > 0)
        .map(|s| {
            let tokens = s.total_tokens(by_session.get(&s.id)) as f64;
            (s, tokens / s.message_count() as f64)
        })
        .filter(|(_, t)| *t > 0.0)
        .collect();
    if per_message.is_empty() {
        return None;
    }
    let mean = stats::mean(&per_message.iter().map(|(_, t)| *t).collect::<Vec<_>>());
    if mean <= TOKEN_HEAVY_PER_MESSAGE {
        return None;
    }
    let affected: Vec<String> = per_message
        .iter()
        .filter(|(_, t)| *t > TOKEN_HEAVY_PER_MESSAGE)
        .map(|(s, _)| s.id.clone())
        .collect();

    Some(Recommendation::new(
        RecommendationCategory::Cost,
        Severity::Medium,
        "Reduce tokens per message",
        format!("Messages average {:.0} tokens", mean),
        ExpectedImpact {
            cost_savings: input.report.cost.total_cost * (1.0 - TOKEN_HEAVY_PER_MESSAGE / mean),
            ..Default::default()
        },
        plan(
            Difficulty::Medium,
            8.0,
            &[
                "Summarize history instead of replaying it",
                "Drop verbose tool output from the context",
            ],
        ),
        Evidence::new(per_message.len(), 0.7, affected),
        MonitoringPlan::new(
            &["tokens_per_message"],
            &[&*format!("Average below {:.0} tokens per message", TOKEN_HEAVY_PER_MESSAGE)],
            "2 weeks",
        ),
    ))
}

fn work_rebalancing(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let patterns = &input.report.patterns;
    let work = &patterns.work_distribution;
    if patterns.sessions_analyzed == 0 || work.balanced {
        return None;
    }
    if work.manager_share == 0.0 && work.worker_share == 0.0 {
        return None;
    }
    let heavier = if work.manager_share > work.worker_share { "manager" } else { "worker" };

    Some(Recommendation::new(
        RecommendationCategory::Efficiency,
        Severity::Medium,
        "Rebalance work between agents",
        format!(
            "The {} carries {:.0}% of messages",
            heavier,
            work.manager_share.max(work.worker_share) * 100.0
        ),
        ExpectedImpact {
            performance_gain: 8.0,
            time_reduction: 10.0,
            ..Default::default()
        },
        plan(
            Difficulty::Easy,
            4.0,
            &[
                "Move execution steps from the manager to the worker",
                "Limit manager turns to planning and review",
            ],
        ),
        Evidence::new(patterns.sessions_analyzed, 0.7, Vec::new()),
        MonitoringPlan::new(
            &["manager_share", "worker_share"],
            &["Each agent carries 30-70% of messages"],
            "2 weeks",
        ),
    ))
}

fn tool_usage_optimization(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let heavy: Vec<String> = input
        .sessions
        .iter()
        .filter(|s| {
            s.message_count() > 0
                && s.tool_call_count() as f64 / s.message_count() as f64 > TOOL_HEAVY_PER_MESSAGE
        })
        .map(|s| s.id.clone())
        .collect();
    if heavy.is_empty() {
        return None;
    }

    Some(Recommendation::new(
        RecommendationCategory::Efficiency,
        Severity::Low,
        "Consolidate tool usage",
        format!("{} sessions call a tool on most messages", heavy.len()),
        ExpectedImpact {
            time_reduction: 10.0,
            ..Default::default()
        },
        plan(
            Difficulty::Medium,
            6.0,
            &["Batch related tool calls", "Cache repeated lookups within a session"],
        ),
        Evidence::new(input.sessions.len(), 0.6, heavy),
        MonitoringPlan::new(
            &["tool_calls_per_message"],
            &[&*format!("Below {:.1} tool calls per message", TOOL_HEAVY_PER_MESSAGE)],
            "2 weeks",
        ),
    ))
}

fn predictive_quality(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let quality = input.report.quality.as_ref()?;
    let at_risk = input
        .report
        .insights
        .iter()
        .any(|i| i.insight_type == InsightType::Performance && i.title == "At-risk session pattern");

    Some(Recommendation::new(
        RecommendationCategory::Quality,
        if at_risk { Severity::High } else { Severity::Medium },
        "Deploy early quality checks",
        format!(
            "Early indicators predict session outcomes with {:.0}% accuracy",
            quality.accuracy * 100.0
        ),
        ExpectedImpact {
            performance_gain: 12.0,
            error_reduction: 20.0,
            ..Default::default()
        },
        plan(
            Difficulty::Hard,
            24.0,
            &[
                "Score each session after its first five messages",
                "Escalate sessions whose indicators exceed the thresholds",
                "Review escalations weekly",
            ],
        ),
        Evidence::new(quality.training_sessions, quality.accuracy, Vec::new()),
        MonitoringPlan::new(
            &["predicted_failure_rate", "observed_failure_rate"],
            &["Observed failure rate drops below the predicted rate"],
            "1 month",
        ),
    ))
}

fn underperformer_remediation(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let under = input
        .report
        .clusters
        .iter()
        .find(|c| c.label == ClusterLabel::UnderPerformers && !c.sessions.is_empty())?;
    if under.improvement_areas.is_empty() {
        return None;
    }

    let steps: Vec<&str> = under.improvement_areas.iter().map(String::as_str).collect();
    Some(Recommendation::new(
        RecommendationCategory::Quality,
        if under.avg_score < 0.5 { Severity::High } else { Severity::Medium },
        "Remediate under-performing sessions",
        format!(
            "{} sessions average a score of {:.2}",
            under.sessions.len(),
            under.avg_score
        ),
        ExpectedImpact {
            performance_gain: 15.0,
            error_reduction: 25.0,
            ..Default::default()
        },
        plan(Difficulty::Medium, 16.0, &steps),
        Evidence::new(under.sessions.len(), 0.7, under.sessions.clone()),
        MonitoringPlan::new(
            &["cluster_avg_score", "error_count"],
            &["Under-performer cluster shrinks by a quarter"],
            "1 month",
        ),
    ))
}

fn critical_error_fixes(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let critical: Vec<&AnomalyPattern> = input
        .anomaly_patterns
        .iter()
        .filter(|p| p.is_recurring && p.severity >= Severity::High)
        .collect();
    if critical.is_empty() {
        return None;
    }

    let mut affected: Vec<String> = critical
        .iter()
        .flat_map(|p| p.affected_sessions.iter().cloned())
        .collect();
    affected.sort();
    affected.dedup();
    let occurrences: usize = critical.iter().map(|p| p.occurrences).sum();
    let titles: Vec<String> = critical.iter().map(|p| p.title.clone()).collect();

    Some(Recommendation::new(
        RecommendationCategory::Reliability,
        Severity::Critical,
        "Fix recurring critical anomalies",
        format!("Recurring: {}", titles.join(", ")),
        ExpectedImpact {
            error_reduction: 40.0,
            performance_gain: 10.0,
            ..Default::default()
        },
        plan(
            Difficulty::Hard,
            20.0,
            &[
                "Reproduce each recurring anomaly from an affected session",
                "Fix the root cause",
                "Add a regression check",
            ],
        ),
        Evidence::new(occurrences, 0.9, affected),
        MonitoringPlan::new(
            &["anomaly_count", "recurring_patterns"],
            &["No recurrence of the listed patterns"],
            "2 weeks",
        ),
    ))
}

fn anomaly_alerting(input: &RecommendationInput<'_>) -> Option<Recommendation> {
    let anomaly_insights = input
        .report
        .insights
        .iter()
        .filter(|i| i.insight_type == InsightType::Anomaly)
        .count();
    if anomaly_insights == 0 && input.anomaly_patterns.is_empty() {
        return None;
    }

    Some(Recommendation::new(
        RecommendationCategory::Reliability,
        Severity::Medium,
        "Route anomaly alerts to operators",
        format!(
            "{} anomaly patterns observed; real-time alerts shorten time to fix",
            input.anomaly_patterns.len()
        ),
        ExpectedImpact {
            error_reduction: 15.0,
            ..Default::default()
        },
        plan(
            Difficulty::Easy,
            2.0,
            &["Subscribe an alerting sink to anomaly events", "Report medium severity during rollout"],
        ),
        Evidence::new(input.anomaly_patterns.len() + anomaly_insights, 0.65, Vec::new()),
        MonitoringPlan::new(
            &["time_to_acknowledge"],
            &["High and critical anomalies acknowledged within an hour"],
            "1 month",
        ),
    ))
}
