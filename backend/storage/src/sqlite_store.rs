/// SQLite-backed conversation sink.
///
/// One row per finished session; the full record is kept as JSON alongside a
/// few columns useful for listing.
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sonicdesk_core::HistoryEntry;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::record::{format_record, object_key, validate_record};
use crate::sink::{SessionMetadata, StorageSink};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS conversations (
     session_id     TEXT PRIMARY KEY,
     object_key     TEXT NOT NULL,
     started_at     TEXT NOT NULL,
     ended_at       TEXT NOT NULL,
     message_count  INTEGER NOT NULL,
     record_json    TEXT NOT NULL
 );
 CREATE INDEX IF NOT EXISTS idx_conversations_ended ON conversations(ended_at);";

pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
    prefix: String,
}

impl SqliteConversationStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path.as_ref())
            .context("Failed to open SQLite conversation database")?;
        conn.execute_batch(&format!("PRAGMA journal_mode=WAL;\n{SCHEMA}"))
            .context("Failed to initialize conversations schema")?;
        info!("SqliteConversationStore opened at {:?}", path.as_ref());
        Ok(Self {
            conn: Mutex::new(conn),
            prefix: prefix.into(),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            prefix: String::new(),
        })
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .query_row(
                "SELECT record_json FROM conversations WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| serde_json::from_str(&r).context("Corrupt conversation record"))
            .transpose()
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl StorageSink for SqliteConversationStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, session_id: &str, history: &[HistoryEntry], metadata: &SessionMetadata) -> Result<()> {
        if history.is_empty() {
            debug!(session_id, "No conversation history to store");
            return Ok(());
        }
        let record = format_record(session_id, history, metadata);
        let value = serde_json::to_value(&record)?;
        validate_record(&value);

        let key = object_key(&self.prefix, session_id, metadata.end_time);
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO conversations
                 (session_id, object_key, started_at, ended_at, message_count, record_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                key,
                metadata.start_time.to_rfc3339(),
                metadata.end_time.to_rfc3339(),
                history.len() as i64,
                value.to_string(),
            ],
        )?;
        info!(session_id, key = %key, "Stored conversation in SQLite");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sonicdesk_core::ConversationHistory;

    fn history() -> Vec<HistoryEntry> {
        let mut h = ConversationHistory::new(10);
        h.append("USER", "book a table", None);
        h.append("ASSISTANT", "done", None);
        h.snapshot()
    }

    #[tokio::test]
    async fn stores_and_reads_back() {
        let store = SqliteConversationStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .store("s-1", &history(), &SessionMetadata::new(now, now))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let record = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(record["metadata"]["messageCount"], 2);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/conversations.db");
        let now = Utc::now();
        {
            let store = SqliteConversationStore::open(&path, "conversations").unwrap();
            store
                .store("s-2", &history(), &SessionMetadata::new(now, now))
                .await
                .unwrap();
        }
        let reopened = SqliteConversationStore::open(&path, "conversations").unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
