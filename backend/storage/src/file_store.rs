//! Conversation sink writing one pretty-printed JSON document per session.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sonicdesk_core::HistoryEntry;
use tracing::{debug, info};

use crate::record::{format_record, object_key, validate_record};
use crate::sink::{SessionMetadata, StorageSink};

pub struct FileConversationStore {
    root: PathBuf,
    prefix: String,
}

impl FileConversationStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a session ending at `metadata.end_time` is written.
    pub fn path_for(&self, session_id: &str, metadata: &SessionMetadata) -> PathBuf {
        self.root
            .join(object_key(&self.prefix, session_id, metadata.end_time))
    }
}

#[async_trait]
impl StorageSink for FileConversationStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn store(&self, session_id: &str, history: &[HistoryEntry], metadata: &SessionMetadata) -> Result<()> {
        if history.is_empty() {
            debug!(session_id, "No conversation history to store");
            return Ok(());
        }

        let record = format_record(session_id, history, metadata);
        let value = serde_json::to_value(&record).context("Failed to encode conversation record")?;
        let report = validate_record(&value);
        if report.is_valid {
            debug!(session_id, "Conversation record validation passed");
        }

        let path = self.path_for(session_id, metadata);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&value)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(session_id, path = %path.display(), "Stored conversation");
        Ok(())
    }
}
