use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sonicdesk_core::HistoryEntry;
use tracing::debug;

/// Timing of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
}

impl SessionMetadata {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            duration_seconds: (end_time - start_time).num_seconds().max(0),
        }
    }
}

/// Receives each finished transcript once, at session teardown.
#[async_trait]
pub trait StorageSink: Send + Sync {
    fn name(&self) -> &str;

    async fn store(
        &self,
        session_id: &str,
        history: &[HistoryEntry],
        metadata: &SessionMetadata,
    ) -> Result<()>;
}

/// Sink used when storage is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl StorageSink for NoopSink {
    fn name(&self) -> &str {
        "none"
    }

    async fn store(&self, session_id: &str, history: &[HistoryEntry], _metadata: &SessionMetadata) -> Result<()> {
        debug!(session_id, messages = history.len(), "Conversation storage disabled; skipping");
        Ok(())
    }
}

pub type SharedSink = Arc<dyn StorageSink>;
