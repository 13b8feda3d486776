//! File-backed session store
//!
//! One pretty-printed JSON document per session, named `session_<id>.json`,
//! holding the session together with its metrics and communications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::{AnalyticsError, Result};
use crate::store::SessionStore;
use crate::types::{AgentCommunication, PerformanceMetric, Session};

/// On-disk shape of one stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session: Session,
    #[serde(default)]
    pub metrics: Vec<PerformanceMetric>,
    #[serde(default)]
    pub communications: Vec<AgentCommunication>,
}

pub struct DirectorySessionStore {
    dir: PathBuf,
}

impl DirectorySessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.sessionsight/sessions`
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sessionsight")
            .join("sessions")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("session_{}.json", session_id))
    }

    /// Write a document, creating the directory if needed
    pub async fn save(&self, document: &SessionDocument) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&document.session.id);
        let json = serde_json::to_string_pretty(document)?;
        fs::write(&path, json).await?;
        debug!(path = %path.display(), "saved session document");
        Ok(path)
    }

    pub async fn load(&self, session_id: &str) -> Result<SessionDocument> {
        let path = self.path_for(session_id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AnalyticsError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// Ids of all stored sessions, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        if !fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix("session_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SessionStore for DirectorySessionStore {
    async fn get_all_sessions(&self) -> Result<Vec<Session>> {
        let ids = self
            .list()
            .await
            .map_err(|e| AnalyticsError::Store(format!("cannot list {}: {}", self.dir.display(), e)))?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&id).await {
                Ok(document) => sessions.push(document.session),
                Err(e) => warn!(session = %id, error = %e, "skipping unreadable session document"),
            }
        }
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn get_session_metrics(&self, session_id: &str) -> Result<Vec<PerformanceMetric>> {
        Ok(self.load(session_id).await?.metrics)
    }

    async fn get_session_communications(&self, session_id: &str) -> Result<Vec<AgentCommunication>> {
        Ok(self.load(session_id).await?.communications)
    }
}
