//! Per-turn performance metrics and agent handoff records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::messages::AgentRole;

/// Performance sample recorded for one agent turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub session_id: String,
    pub role: AgentRole,
    pub timestamp: DateTime<Utc>,
    /// Response time in milliseconds
    pub response_time_ms: f64,
    pub token_usage: u64,
    pub cost: f64,
    /// Fraction of failed operations in this turn (0.0 to 1.0)
    pub error_rate: f64,
}

impl PerformanceMetric {
    pub fn new(session_id: impl Into<String>, role: AgentRole, response_time_ms: f64) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            timestamp: Utc::now(),
            response_time_ms,
            token_usage: 0,
            cost: 0.0,
            error_rate: 0.0,
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.token_usage = tokens;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Directional handoff between agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommunication {
    pub session_id: String,
    pub from: AgentRole,
    pub to: AgentRole,
    pub timestamp: DateTime<Utc>,
}

impl AgentCommunication {
    pub fn new(
        session_id: impl Into<String>,
        from: AgentRole,
        to: AgentRole,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            from,
            to,
            timestamp,
        }
    }
}

/// Records from a flat list grouped by owning session id, grouped in one pass
#[derive(Debug, Clone)]
pub struct BySession<'a, T> {
    groups: HashMap<&'a str, Vec<T>>,
}

impl<'a, T: Clone> BySession<'a, T> {
    pub fn group(items: &'a [T], session_id: impl Fn(&'a T) -> &'a str) -> Self {
        let mut groups: HashMap<&str, Vec<T>> = HashMap::new();
        for item in items {
            groups.entry(session_id(item)).or_default().push(item.clone());
        }
        Self { groups }
    }

    /// Records for one session; empty when it has none
    pub fn get(&self, session_id: &str) -> &[T] {
        self.groups.get(session_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

pub fn metrics_by_session(metrics: &[PerformanceMetric]) -> BySession<'_, PerformanceMetric> {
    BySession::group(metrics, |m| m.session_id.as_str())
}

pub fn communications_by_session(
    communications: &[AgentCommunication],
) -> BySession<'_, AgentCommunication> {
    BySession::group(communications, |c| c.session_id.as_str())
}

/// Gaps between consecutive handoffs, in milliseconds
pub fn handoff_latencies(communications: &[AgentCommunication]) -> Vec<f64> {
    let mut sorted: Vec<&AgentCommunication> = communications.iter().collect();
    sorted.sort_by_key(|c| c.timestamp);
    sorted
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_milliseconds().max(0) as f64)
        .collect()
}

/// Share of consecutive handoffs where the previous recipient picks up the work
///
/// Returns `None` with fewer than two communications.
pub fn coordination_score(communications: &[AgentCommunication]) -> Option<f64> {
    if communications.len() < 2 {
        return None;
    }
    let mut sorted: Vec<&AgentCommunication> = communications.iter().collect();
    sorted.sort_by_key(|c| c.timestamp);
    let pairs = sorted.len() - 1;
    let coherent = sorted
        .windows(2)
        .filter(|pair| pair[0].to == pair[1].from && pair[1].from != pair[1].to)
        .count();
    Some(coherent as f64 / pairs as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn comm(from: AgentRole, to: AgentRole, offset_ms: i64) -> AgentCommunication {
        let base = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        AgentCommunication::new("s1", from, to, base + Duration::milliseconds(offset_ms))
    }

    #[test]
    fn test_handoff_latencies_sorted() {
        let comms = vec![
            comm(AgentRole::Worker, AgentRole::Manager, 3000),
            comm(AgentRole::Manager, AgentRole::Worker, 0),
            comm(AgentRole::Manager, AgentRole::Worker, 4500),
        ];
        assert_eq!(handoff_latencies(&comms), vec![3000.0, 1500.0]);
    }

    #[test]
    fn test_coordination_perfect_alternation() {
        let comms = vec![
            comm(AgentRole::Manager, AgentRole::Worker, 0),
            comm(AgentRole::Worker, AgentRole::Manager, 1000),
            comm(AgentRole::Manager, AgentRole::Worker, 2000),
        ];
        assert_eq!(coordination_score(&comms), Some(1.0));
    }

    #[test]
    fn test_grouping_by_session() {
        let metrics = vec![
            PerformanceMetric::new("a", AgentRole::Manager, 100.0),
            PerformanceMetric::new("b", AgentRole::Worker, 200.0),
            PerformanceMetric::new("a", AgentRole::Worker, 300.0),
        ];
        let grouped = metrics_by_session(&metrics);
        let own: Vec<f64> = grouped.get("a").iter().map(|m| m.response_time_ms).collect();
        assert_eq!(own, vec![100.0, 300.0]);
        assert_eq!(grouped.get("b").len(), 1);
        assert!(grouped.get("missing").is_empty());

        let comms = vec![comm(AgentRole::Manager, AgentRole::Worker, 0)];
        assert_eq!(communications_by_session(&comms).get("s1").len(), 1);
    }

    #[test]
    fn test_coordination_broken_chain() {
        let comms = vec![
            comm(AgentRole::Manager, AgentRole::Worker, 0),
            comm(AgentRole::Manager, AgentRole::Worker, 1000),
        ];
        assert_eq!(coordination_score(&comms), Some(0.0));
        assert_eq!(coordination_score(&comms[..1]), None);
    }
}
