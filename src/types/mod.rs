//! Type definitions module
//!
//! Session-store shapes consumed by the analytics core: sessions, their
//! messages, per-turn performance metrics and agent handoff records.

pub mod messages;
pub mod metrics;
pub mod session;

// Re-export commonly used types
pub use messages::{AgentRole, Message, MessageKind, MessageMetadata};
pub use metrics::{AgentCommunication, BySession, PerformanceMetric};
pub use session::{Session, SessionStatus, SessionSummary};
