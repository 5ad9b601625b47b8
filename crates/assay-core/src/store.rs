//! Persistence contract.
//!
//! The pipeline owns only the read/write contract, not the storage engine.
//! Documents cross the boundary as JSON so any document store can sit behind
//! the trait; the in-memory implementation keeps the same serialization
//! round-trip so tests exercise the real contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::session::{Session, SessionState};
use crate::telemetry::MetricSnapshot;
use crate::verdict::SkillProfile;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Editor snapshot persisted on every successful state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorSnapshot {
    pub code: String,
    pub cursor: u32,
    pub state: SessionState,
}

/// Durable store for sessions, metric snapshots, and skill profiles.
///
/// Implementations must be safe to call from multiple sessions concurrently;
/// the pipeline never issues concurrent writes for the same session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn load_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Best-effort editor snapshot; callers log and swallow failures.
    async fn save_editor_snapshot(
        &self,
        session_id: &str,
        snapshot: &EditorSnapshot,
    ) -> Result<(), StoreError>;

    /// Best-effort per-event metrics append; callers log and swallow failures.
    async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), StoreError>;

    async fn load_profile(&self, user_id: &str) -> Result<Option<SkillProfile>, StoreError>;
    async fn save_profile(&self, user_id: &str, profile: &SkillProfile) -> Result<(), StoreError>;
}

/// In-memory reference implementation.
///
/// Sessions and profiles are stored as serialized JSON documents, so a load
/// always exercises the same round-trip a real document store would.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, String>>,
    editor_snapshots: RwLock<HashMap<String, Vec<EditorSnapshot>>>,
    metric_snapshots: RwLock<Vec<MetricSnapshot>>,
    profiles: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All metric snapshots recorded for a session (test/replay support).
    pub async fn metric_snapshots_for(&self, session_id: &str) -> Vec<MetricSnapshot> {
        self.metric_snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Editor snapshots recorded for a session, in write order.
    pub async fn editor_snapshots_for(&self, session_id: &str) -> Vec<EditorSnapshot> {
        self.editor_snapshots
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let doc = serde_json::to_string(session)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.sessions.write().await.insert(session.id.clone(), doc);
        Ok(())
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        match self.sessions.read().await.get(id) {
            Some(doc) => serde_json::from_str(doc)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_editor_snapshot(
        &self,
        session_id: &str,
        snapshot: &EditorSnapshot,
    ) -> Result<(), StoreError> {
        self.editor_snapshots
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), StoreError> {
        self.metric_snapshots.write().await.push(snapshot.clone());
        Ok(())
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<SkillProfile>, StoreError> {
        match self.profiles.read().await.get(user_id) {
            Some(doc) => serde_json::from_str(doc)
                .map(Some)
                .map_err(|e| StoreError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn save_profile(&self, user_id: &str, profile: &SkillProfile) -> Result<(), StoreError> {
        let doc = serde_json::to_string(profile)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.profiles.write().await.insert(user_id.to_string(), doc);
        Ok(())
    }
}
