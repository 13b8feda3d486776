//! Message types for dual-agent sessions
//!
//! Messages are append-only within a session and carry the agent role,
//! the message kind and optional execution metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Agent that produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Manager,
    Worker,
    System,
}

impl AgentRole {
    /// Single-letter code used in agent sequence patterns
    pub fn code(&self) -> char {
        match self {
            AgentRole::Manager => 'M',
            AgentRole::Worker => 'W',
            AgentRole::System => 'S',
        }
    }

    /// Whether this role takes part in manager/worker handoffs
    pub fn is_agent(&self) -> bool {
        !matches!(self, AgentRole::System)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Manager => write!(f, "manager"),
            AgentRole::Worker => write!(f, "worker"),
            AgentRole::System => write!(f, "system"),
        }
    }
}

/// Kind of message exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Prompt,
    Response,
    Error,
    ToolCall,
    Status,
}

/// Optional execution metadata attached to a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool names used while producing the message
    #[serde(default)]
    pub tools: Vec<String>,
    /// Time taken to produce the message (milliseconds)
    pub duration_ms: Option<f64>,
    /// Estimated token count
    pub tokens: Option<u64>,
    /// Cost attributed to this message
    pub cost: Option<f64>,
}

/// A single message within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: AgentRole,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(
        session_id: impl Into<String>,
        role: AgentRole,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.metadata_mut().duration_ms = Some(duration_ms);
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.metadata_mut().tokens = Some(tokens);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.metadata_mut().cost = Some(cost);
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.metadata_mut().tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    fn metadata_mut(&mut self) -> &mut MessageMetadata {
        self.metadata.get_or_insert_with(MessageMetadata::default)
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.duration_ms)
    }

    pub fn tokens(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.tokens)
    }

    pub fn cost(&self) -> Option<f64> {
        self.metadata.as_ref().and_then(|m| m.cost)
    }

    /// Tool invocations represented by this message
    pub fn tool_invocations(&self) -> usize {
        let listed = self.metadata.as_ref().map(|m| m.tools.len()).unwrap_or(0);
        if self.kind == MessageKind::ToolCall {
            listed.max(1)
        } else {
            listed
        }
    }

    /// Whether the content reports a failure, regardless of message kind
    pub fn mentions_error(&self) -> bool {
        if self.is_error() {
            return true;
        }
        let lower = self.content.to_lowercase();
        ["error", "exception", "failed", "traceback"]
            .iter()
            .any(|kw| lower.contains(kw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes() {
        assert_eq!(AgentRole::Manager.code(), 'M');
        assert_eq!(AgentRole::Worker.code(), 'W');
        assert!(!AgentRole::System.is_agent());
    }

    #[test]
    fn test_builder_metadata() {
        let msg = Message::new("s1", AgentRole::Worker, MessageKind::Response, "done")
            .with_duration(1200.0)
            .with_tokens(300)
            .with_tools(&["read_file", "grep"]);
        assert_eq!(msg.duration_ms(), Some(1200.0));
        assert_eq!(msg.tokens(), Some(300));
        assert_eq!(msg.tool_invocations(), 2);
    }

    #[test]
    fn test_tool_call_counts_at_least_once() {
        let msg = Message::new("s1", AgentRole::Worker, MessageKind::ToolCall, "ls");
        assert_eq!(msg.tool_invocations(), 1);
    }

    #[test]
    fn test_mentions_error() {
        let plain = Message::new("s1", AgentRole::Worker, MessageKind::Response, "all good");
        let reported = Message::new("s1", AgentRole::Worker, MessageKind::Response, "Build FAILED");
        let typed = Message::new("s1", AgentRole::System, MessageKind::Error, "oops");
        assert!(!plain.mentions_error());
        assert!(reported.mentions_error());
        assert!(typed.mentions_error());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&MessageKind::ToolCall).unwrap();
        assert_eq!(json, "\"tool_call\"");
        let role: AgentRole = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, AgentRole::Manager);
    }
}
