//! Session store seam
//!
//! The analytics core only reads from the store. Enumeration failure is
//! fatal to an analysis; per-session metric or communication failures are
//! logged by the caller and skipped.

pub mod directory;
pub mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{AgentCommunication, PerformanceMetric, Session};

pub use directory::{DirectorySessionStore, SessionDocument};
pub use memory::InMemorySessionStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_all_sessions(&self) -> Result<Vec<Session>>;

    async fn get_session_metrics(&self, session_id: &str) -> Result<Vec<PerformanceMetric>>;

    async fn get_session_communications(&self, session_id: &str) -> Result<Vec<AgentCommunication>>;
}
