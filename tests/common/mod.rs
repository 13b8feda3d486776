//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use sessionsight::types::{
    AgentCommunication, AgentRole, Message, MessageKind, PerformanceMetric, Session,
    SessionStatus, SessionSummary,
};
use sessionsight::InMemorySessionStore;

pub fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// One finished session with alternating manager/worker turns
///
/// `index` varies timing, cost and size slightly so every baseline metric
/// has some spread.
pub fn recorded_session(index: usize) -> (Session, Vec<PerformanceMetric>, Vec<AgentCommunication>) {
    let id = format!("session-{:02}", index);
    let start = day_start() + Duration::days((index % 7) as i64) + Duration::hours((index % 5) as i64);
    let mut session = Session::new(&id, format!("task {}", index)).starting_at(start);

    let message_count = 8 + index % 4;
    let mut metrics = Vec::new();
    let mut communications = Vec::new();
    let mut previous: Option<AgentRole> = None;

    for i in 0..message_count {
        let role = if i % 2 == 0 { AgentRole::Manager } else { AgentRole::Worker };
        let kind = if i % 4 == 3 { MessageKind::ToolCall } else { MessageKind::Response };
        let at = start + Duration::seconds(i as i64 * 30);
        let response_ms = 1800.0 + ((index + i) % 5) as f64 * 100.0;

        let mut message = Message::new(&id, role, kind, format!("turn {}", i))
            .at(at)
            .with_duration(response_ms)
            .with_tokens(120 + (index % 3) as u64 * 10);
        if kind == MessageKind::ToolCall {
            message = message.with_tools(&["read_file"]);
        }
        session.append_message(message);

        metrics.push(
            PerformanceMetric::new(&id, role, response_ms)
                .with_tokens(120)
                .with_cost(0.01 + (index % 4) as f64 * 0.002)
                .at(at),
        );
        if let Some(from) = previous {
            communications.push(AgentCommunication::new(&id, from, role, at));
        }
        previous = Some(role);
    }

    let success_rate = 0.8 + (index % 3) as f64 * 0.05;
    let total_cost: f64 = metrics.iter().map(|m| m.cost).sum();
    session.finish(
        SessionStatus::Completed,
        start + Duration::seconds(message_count as i64 * 30),
    );
    session.backfill_summary(SessionSummary {
        success_rate,
        total_cost,
        tools_used: vec!["read_file".to_string()],
    });

    (session, metrics, communications)
}

/// A session whose responses are ten times slower than the corpus
pub fn slow_session(id: &str) -> Session {
    slow_session_at(id, day_start() + Duration::days(8))
}

pub fn slow_session_at(id: &str, start: DateTime<Utc>) -> Session {
    let mut session = Session::new(id, "slow task").starting_at(start);
    for i in 0..10 {
        let role = if i % 2 == 0 { AgentRole::Manager } else { AgentRole::Worker };
        session.append_message(
            Message::new(id, role, MessageKind::Response, format!("turn {}", i))
                .at(start + Duration::seconds(i as i64 * 30))
                .with_duration(20_000.0)
                .with_tokens(120),
        );
    }
    session
}

pub async fn populated_store(sessions: usize) -> InMemorySessionStore {
    let store = InMemorySessionStore::new();
    for index in 0..sessions {
        let (session, metrics, communications) = recorded_session(index);
        store.insert(session, metrics, communications).await;
    }
    store
}
