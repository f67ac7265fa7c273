pub mod file_store;
pub mod record;
pub mod sink;
pub mod sqlite_store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

pub use file_store::FileConversationStore;
pub use record::{format_record, object_key, validate_record, ConversationRecord, ValidationReport};
pub use sink::{NoopSink, SessionMetadata, SharedSink, StorageSink};
pub use sqlite_store::SqliteConversationStore;

/// Build the configured sink. `backend` is `file`, `sqlite` or `none`.
pub fn open_sink(enabled: bool, backend: &str, path: &Path, prefix: &str) -> Result<SharedSink> {
    if !enabled {
        return Ok(Arc::new(NoopSink));
    }
    let sink: SharedSink = match backend {
        "file" => Arc::new(FileConversationStore::new(path, prefix)),
        "sqlite" => Arc::new(SqliteConversationStore::open(path, prefix)?),
        "none" => Arc::new(NoopSink),
        other => anyhow::bail!("unknown storage backend '{other}'"),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_backend() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(open_sink(false, "file", dir.path(), "c").unwrap().name(), "none");
        assert_eq!(open_sink(true, "file", dir.path(), "c").unwrap().name(), "file");
        let db = dir.path().join("c.db");
        assert_eq!(open_sink(true, "sqlite", &db, "c").unwrap().name(), "sqlite");
        assert!(open_sink(true, "s3", dir.path(), "c").is_err());
    }
}
