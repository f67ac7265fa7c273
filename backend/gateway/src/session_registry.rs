//! Active session tracking and the process-lifetime carry-over transcript.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sonicdesk_core::HistoryEntry;
use tokio::sync::RwLock;
use tracing::debug;

pub type SessionId = String;

/// Shared between every connection of one gateway process.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, DateTime<Utc>>>>,
    carry_over: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected session.
    pub async fn register(&self, session_id: SessionId) {
        let mut w = self.sessions.write().await;
        w.insert(session_id, Utc::now());
    }

    /// Unregister a disconnected session.
    pub async fn unregister(&self, session_id: &str) {
        let mut w = self.sessions.write().await;
        w.remove(session_id);
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ids of connected sessions, oldest first.
    pub async fn active_ids(&self) -> Vec<SessionId> {
        let r = self.sessions.read().await;
        let mut ids: Vec<_> = r.iter().map(|(id, at)| (*at, id.clone())).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// The transcript of the most recent session that produced one.
    pub async fn carry_over(&self) -> Vec<HistoryEntry> {
        self.carry_over.read().await.clone()
    }

    /// Replace the carry-over transcript. Empty transcripts are ignored.
    pub async fn set_carry_over(&self, history: Vec<HistoryEntry>) {
        if history.is_empty() {
            return;
        }
        debug!(entries = history.len(), "Updated carry-over transcript");
        *self.carry_over.write().await = history;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonicdesk_core::{ConversationHistory, Role};

    #[tokio::test]
    async fn tracks_sessions() {
        let registry = SessionRegistry::new();
        registry.register("a".into()).await;
        registry.register("b".into()).await;
        assert_eq!(registry.active_count().await, 2);
        registry.unregister("a").await;
        assert_eq!(registry.active_ids().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn carry_over_keeps_last_non_empty() {
        let registry = SessionRegistry::new();
        let mut history = ConversationHistory::new(10);
        history.append_role(Role::User, "hello", None);
        registry.set_carry_over(history.snapshot()).await;
        registry.set_carry_over(Vec::new()).await;
        let carried = registry.carry_over().await;
        assert_eq!(carried.len(), 1);
        assert_eq!(carried[0].text, "hello");
    }
}
