//! Recorded dual-agent sessions
//!
//! A session is created when an agent run starts, grows by message append and
//! becomes immutable once completed or failed (apart from summary backfill).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::messages::{AgentRole, Message, MessageKind};
use crate::types::metrics::PerformanceMetric;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Outcome summary, usually backfilled after completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    pub total_cost: f64,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

/// A recorded manager/worker collaboration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub initial_task: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: Option<SessionSummary>,
}

impl Session {
    /// Create a running session starting now
    pub fn new(id: impl Into<String>, initial_task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Running,
            initial_task: initial_task.into(),
            messages: Vec::new(),
            summary: None,
        }
    }

    pub fn starting_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Append a message; ignored once the session is finished
    pub fn append_message(&mut self, message: Message) -> bool {
        if self.is_finished() {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Transition to a terminal status
    pub fn finish(&mut self, status: SessionStatus, end_time: DateTime<Utc>) {
        if self.is_finished() || status == SessionStatus::Running {
            return;
        }
        self.status = status;
        self.end_time = Some(end_time);
    }

    /// Backfill the outcome summary (allowed after completion)
    pub fn backfill_summary(&mut self, summary: SessionSummary) {
        self.summary = Some(summary);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, SessionStatus::Completed | SessionStatus::Failed)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_error()).count()
    }

    pub fn tool_call_count(&self) -> usize {
        self.messages.iter().map(Message::tool_invocations).sum()
    }

    pub fn role_count(&self, role: AgentRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn kind_count(&self, kind: MessageKind) -> usize {
        self.messages.iter().filter(|m| m.kind == kind).count()
    }

    /// Number of manager/worker alternations (system messages ignored)
    pub fn agent_switches(&self) -> usize {
        count_switches(&self.messages)
    }

    /// Duration in milliseconds; running sessions use the last message time
    pub fn duration_ms(&self) -> Option<f64> {
        let end = self
            .end_time
            .or_else(|| self.messages.iter().map(|m| m.timestamp).max())?;
        Some((end - self.start_time).num_milliseconds().max(0) as f64)
    }

    /// Success indicator in [0, 1]
    ///
    /// The summary wins when present; otherwise the terminal status decides
    /// and running sessions sit at 0.5.
    pub fn success_score(&self) -> f64 {
        if let Some(summary) = &self.summary {
            return summary.success_rate.clamp(0.0, 1.0);
        }
        match self.status {
            SessionStatus::Completed => 1.0,
            SessionStatus::Failed => 0.0,
            SessionStatus::Running => 0.5,
        }
    }

    /// Explicit success rate, only known when a summary exists
    pub fn success_rate(&self) -> Option<f64> {
        self.summary.as_ref().map(|s| s.success_rate)
    }

    /// Session cost from the summary, else from metrics, else from message metadata
    pub fn total_cost(&self, metrics: &[PerformanceMetric]) -> f64 {
        if let Some(summary) = &self.summary {
            return summary.total_cost;
        }
        let from_metrics: f64 = metrics
            .iter()
            .filter(|m| m.session_id == self.id)
            .map(|m| m.cost)
            .sum();
        if from_metrics > 0.0 {
            return from_metrics;
        }
        self.messages.iter().filter_map(Message::cost).sum()
    }

    /// Token usage from metrics, else from message metadata
    pub fn total_tokens(&self, metrics: &[PerformanceMetric]) -> u64 {
        let from_metrics: u64 = metrics
            .iter()
            .filter(|m| m.session_id == self.id)
            .map(|m| m.token_usage)
            .sum();
        if from_metrics > 0 {
            return from_metrics;
        }
        self.messages.iter().filter_map(Message::tokens).sum()
    }

    /// Average response time from metrics, else from message durations
    pub fn avg_response_time(&self, metrics: &[PerformanceMetric]) -> Option<f64> {
        let samples: Vec<f64> = metrics
            .iter()
            .filter(|m| m.session_id == self.id)
            .map(|m| m.response_time_ms)
            .collect();
        if !samples.is_empty() {
            return Some(samples.iter().sum::<f64>() / samples.len() as f64);
        }
        let durations: Vec<f64> = self.messages.iter().filter_map(Message::duration_ms).collect();
        if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        }
    }

    /// Distinct tool names seen in the session
    pub fn tools_used(&self) -> BTreeSet<String> {
        let mut tools: BTreeSet<String> = self
            .messages
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .flat_map(|m| m.tools.iter().cloned())
            .collect();
        if let Some(summary) = &self.summary {
            tools.extend(summary.tools_used.iter().cloned());
        }
        tools
    }

    /// The first `n` messages, used as early indicators
    pub fn early_messages(&self, n: usize) -> &[Message] {
        &self.messages[..self.messages.len().min(n)]
    }
}

/// Count manager/worker alternations in a message sequence
pub fn count_switches(messages: &[Message]) -> usize {
    let mut last: Option<AgentRole> = None;
    let mut switches = 0;
    for role in messages.iter().map(|m| m.role).filter(AgentRole::is_agent) {
        if let Some(prev) = last {
            if prev != role {
                switches += 1;
            }
        }
        last = Some(role);
    }
    switches
}
