//! In-memory session store

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::errors::{AnalyticsError, Result};
use crate::store::SessionStore;
use crate::types::{AgentCommunication, Message, PerformanceMetric, Session};

/// Store backed by maps; supports injected failures for testing degraded loads
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Vec<Session>>,
    metrics: RwLock<HashMap<String, Vec<PerformanceMetric>>>,
    communications: RwLock<HashMap<String, Vec<AgentCommunication>>>,
    failing_sessions: RwLock<HashSet<String>>,
    fail_enumeration: RwLock<bool>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session with its metrics and communications
    pub async fn insert(
        &self,
        session: Session,
        metrics: Vec<PerformanceMetric>,
        communications: Vec<AgentCommunication>,
    ) {
        let id = session.id.clone();
        {
            let mut sessions = self.sessions.write().await;
            match sessions.iter_mut().find(|s| s.id == id) {
                Some(existing) => *existing = session,
                None => sessions.push(session),
            }
        }
        self.metrics.write().await.insert(id.clone(), metrics);
        self.communications.write().await.insert(id, communications);
    }

    /// Append a message to a stored session; false if unknown or finished
    pub async fn append_message(&self, session_id: &str, message: Message) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .map(|s| s.append_message(message))
            .unwrap_or(false)
    }

    pub async fn add_metric(&self, metric: PerformanceMetric) {
        self.metrics
            .write()
            .await
            .entry(metric.session_id.clone())
            .or_default()
            .push(metric);
    }

    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.iter().find(|s| s.id == session_id).cloned()
    }

    /// Make metric and communication loads fail for one session
    pub async fn fail_session(&self, session_id: &str) {
        self.failing_sessions.write().await.insert(session_id.to_string());
    }

    /// Make `get_all_sessions` fail
    pub async fn fail_enumeration(&self, fail: bool) {
        *self.fail_enumeration.write().await = fail;
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn check(&self, session_id: &str) -> Result<()> {
        if self.failing_sessions.read().await.contains(session_id) {
            return Err(AnalyticsError::Store(format!(
                "injected failure for session {}",
                session_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        if *self.fail_enumeration.read().await {
            return Err(AnalyticsError::Store("session enumeration unavailable".to_string()));
        }
        Ok(self.sessions.read().await.clone())
    }

    async fn get_session_metrics(&self, session_id: &str) -> Result<Vec<PerformanceMetric>> {
        self.check(session_id).await?;
        Ok(self.metrics.read().await.get(session_id).cloned().unwrap_or_default())
    }

    async fn get_session_communications(&self, session_id: &str) -> Result<Vec<AgentCommunication>> {
        self.check(session_id).await?;
        Ok(self
            .communications
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentRole, MessageKind};

    #[tokio::test]
    async fn test_insert_replaces_by_id() {
        let store = InMemorySessionStore::new();
        store.insert(Session::new("a", "first"), vec![], vec![]).await;
        store.insert(Session::new("a", "second"), vec![], vec![]).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get_session("a").await.unwrap().initial_task, "second");
    }

    #[tokio::test]
    async fn test_append_and_metrics() {
        let store = InMemorySessionStore::new();
        store.insert(Session::new("a", "task"), vec![], vec![]).await;
        assert!(
            store
                .append_message("a", Message::new("a", AgentRole::Manager, MessageKind::Prompt, "go"))
                .await
        );
        assert!(
            !store
                .append_message("missing", Message::new("missing", AgentRole::Worker, MessageKind::Response, "x"))
                .await
        );
        store.add_metric(PerformanceMetric::new("a", AgentRole::Worker, 900.0)).await;

        assert_eq!(store.get_session("a").await.unwrap().message_count(), 1);
        assert_eq!(store.get_session_metrics("a").await.unwrap().len(), 1);
        assert!(store.get_session_communications("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemorySessionStore::new();
        store.insert(Session::new("a", "task"), vec![], vec![]).await;
        store.fail_session("a").await;
        assert!(store.get_session_metrics("a").await.is_err());
        assert!(store.get_session_communications("a").await.is_err());

        store.fail_enumeration(true).await;
        assert!(matches!(store.get_all_sessions().await, Err(AnalyticsError::Store(_))));
    }
}
