//! Collaboration pattern analysis
//!
//! Exchange-rate distribution, handoff timing, agent sequences, work
//! distribution and peak hours across a set of sessions.

use chrono::Timelike;
use std::collections::{BTreeMap, HashMap};

use crate::insights::types::{
    CategoryShare, CollaborationPatterns, ExchangeRateBucket, PeakHour, SequencePattern,
    WorkDistribution,
};
use crate::stats;
use crate::types::{AgentRole, Message, MessageKind, Session};

/// Minimum success rate for a sequence pattern to be reported
pub const SEQUENCE_SUCCESS_FLOOR: f64 = 0.6;

/// Balanced share band for work distribution
pub const BALANCED_RANGE: (f64, f64) = (0.3, 0.7);

pub fn analyze_collaboration(sessions: &[Session]) -> CollaborationPatterns {
    let exchange_rates = exchange_rate_distribution(sessions);
    let optimal_exchange_rate = exchange_rates
        .iter()
        .filter(|b| b.rate > 0.0)
        .max_by(|a, b| {
            a.avg_success
                .partial_cmp(&b.avg_success)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.sessions.cmp(&b.sessions))
        })
        .map(|b| b.rate);

    CollaborationPatterns {
        exchange_rates,
        optimal_exchange_rate,
        avg_handoff_ms: average_handoff_ms(sessions),
        sequences: sequence_patterns(sessions),
        work_distribution: work_distribution(sessions),
        peak_hours: peak_hours(sessions),
        sessions_analyzed: sessions.len(),
    }
}

/// Agent switches per minute, `None` when the session has no duration
pub fn exchange_rate(session: &Session) -> Option<f64> {
    let minutes = session.duration_ms()? / 60_000.0;
    if minutes <= 0.0 {
        return None;
    }
    Some(session.agent_switches() as f64 / minutes)
}

fn bucket(rate: f64) -> f64 {
    (rate * 2.0).round() / 2.0
}

fn exchange_rate_distribution(sessions: &[Session]) -> Vec<ExchangeRateBucket> {
    // Keyed by half-steps so the map key stays integral
    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for session in sessions {
        if let Some(rate) = exchange_rate(session) {
            let key = (bucket(rate) * 2.0) as i64;
            buckets.entry(key).or_default().push(session.success_score());
        }
    }
    buckets
        .into_iter()
        .map(|(key, scores)| ExchangeRateBucket {
            rate: key as f64 / 2.0,
            sessions: scores.len(),
            avg_success: stats::mean(&scores),
        })
        .collect()
}

/// Gaps between consecutive agent messages at role changes
pub fn handoff_gaps(messages: &[Message]) -> Vec<f64> {
    let agents: Vec<&Message> = messages.iter().filter(|m| m.role.is_agent()).collect();
    agents
        .windows(2)
        .filter(|pair| pair[0].role != pair[1].role)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds().max(0) as f64)
        .collect()
}

fn average_handoff_ms(sessions: &[Session]) -> Option<f64> {
    let gaps: Vec<f64> = sessions.iter().flat_map(|s| handoff_gaps(&s.messages)).collect();
    if gaps.is_empty() {
        None
    } else {
        Some(stats::mean(&gaps))
    }
}

/// Run-length collapsed role sequence reduced to its smallest repeating cycle
///
/// `M M W W M W` collapses to `M+W+M+W+`, which reduces to `M+W+`.
pub fn sequence_signature(messages: &[Message]) -> Option<String> {
    let mut runs: Vec<char> = Vec::new();
    for role in messages.iter().map(|m| m.role) {
        let code = role.code();
        if runs.last() != Some(&code) {
            runs.push(code);
        }
    }
    if runs.is_empty() {
        return None;
    }

    let period = (1..=runs.len())
        .find(|&p| runs.iter().enumerate().all(|(i, c)| *c == runs[i % p]))
        .unwrap_or(runs.len());

    Some(runs[..period].iter().map(|c| format!("{}+", c)).collect())
}

fn sequence_patterns(sessions: &[Session]) -> Vec<SequencePattern> {
    let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
    for session in sessions {
        if let Some(signature) = sequence_signature(&session.messages) {
            grouped.entry(signature).or_default().push(session.success_score());
        }
    }

    let mut patterns: Vec<SequencePattern> = grouped
        .into_iter()
        .map(|(pattern, scores)| SequencePattern {
            pattern,
            occurrences: scores.len(),
            success_rate: stats::mean(&scores),
        })
        .filter(|p| p.success_rate > SEQUENCE_SUCCESS_FLOOR)
        .collect();

    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then(b.success_rate.partial_cmp(&a.success_rate).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.pattern.cmp(&b.pattern))
    });
    patterns
}

fn kind_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Prompt => "prompt",
        MessageKind::Response => "response",
        MessageKind::Error => "error",
        MessageKind::ToolCall => "tool_call",
        MessageKind::Status => "status",
    }
}

pub fn work_distribution(sessions: &[Session]) -> WorkDistribution {
    let mut manager = 0usize;
    let mut worker = 0usize;
    let mut per_kind: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();

    for message in sessions.iter().flat_map(|s| s.messages.iter()) {
        let entry = per_kind.entry(kind_name(message.kind)).or_default();
        match message.role {
            AgentRole::Manager => {
                manager += 1;
                entry.0 += 1;
            }
            AgentRole::Worker => {
                worker += 1;
                entry.1 += 1;
            }
            AgentRole::System => {}
        }
    }

    let total = manager + worker;
    if total == 0 {
        return WorkDistribution::default();
    }

    let manager_share = manager as f64 / total as f64;
    let worker_share = worker as f64 / total as f64;
    let in_band = |share: f64| share >= BALANCED_RANGE.0 && share <= BALANCED_RANGE.1;

    let categories = per_kind
        .into_iter()
        .filter(|(_, (m, w))| m + w > 0)
        .map(|(kind, (m, w))| {
            let sum = (m + w) as f64;
            (
                kind.to_string(),
                CategoryShare {
                    manager: m as f64 / sum,
                    worker: w as f64 / sum,
                },
            )
        })
        .collect();

    WorkDistribution {
        manager_share,
        worker_share,
        balanced: in_band(manager_share) && in_band(worker_share),
        categories,
    }
}

/// Top three start hours by average session score
fn peak_hours(sessions: &[Session]) -> Vec<PeakHour> {
    let mut by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for session in sessions {
        by_hour
            .entry(session.start_time.hour())
            .or_default()
            .push(session.success_score());
    }

    let mut hours: Vec<PeakHour> = by_hour
        .into_iter()
        .map(|(hour, scores)| PeakHour {
            hour,
            avg_score: stats::mean(&scores),
            sessions: scores.len(),
        })
        .collect();
    hours.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.sessions.cmp(&a.sessions))
    });
    hours.truncate(3);
    hours
}
