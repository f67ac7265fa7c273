//! Bounded, role-tagged conversation transcript.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::role::{Role, RoleClassifier};

/// Default sliding-window size.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Where a history entry came from, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub has_content: bool,
}

impl SourceInfo {
    pub fn new(source: impl Into<String>, event_type: Option<&str>, has_content: bool) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.map(str::to_string),
            has_content,
        }
    }
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub content_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_info: Option<SourceInfo>,
    /// The invalid label this entry's role was corrected from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_from: Option<String>,
}

impl HistoryEntry {
    /// RFC 3339 timestamp with a `Z` suffix.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

/// Ordered transcript capped at `max_history` entries; oldest dropped first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
    max_history: usize,
    corrections: usize,
    classifier: RoleClassifier,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationHistory {
    pub fn new(max_history: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_history: max_history.max(1),
            corrections: 0,
            classifier: RoleClassifier::new(),
        }
    }

    /// Append an entry under a wire role label.
    ///
    /// Labels other than `USER`/`ASSISTANT` are corrected to the default role;
    /// the original label is kept on the entry and counted in [`corrections`].
    ///
    /// [`corrections`]: ConversationHistory::corrections
    pub fn append(
        &mut self,
        role_label: &str,
        text: impl Into<String>,
        source_info: Option<SourceInfo>,
    ) -> &HistoryEntry {
        let (role, corrected_from) = match Role::parse(role_label) {
            Some(role) => (role, None),
            None => {
                self.corrections += 1;
                (self.classifier.correct(role_label), Some(role_label.to_string()))
            }
        };
        self.push(role, text.into(), source_info, corrected_from)
    }

    /// Append an entry with an already-typed role.
    pub fn append_role(
        &mut self,
        role: Role,
        text: impl Into<String>,
        source_info: Option<SourceInfo>,
    ) -> &HistoryEntry {
        self.push(role, text.into(), source_info, None)
    }

    fn push(
        &mut self,
        role: Role,
        text: String,
        source_info: Option<SourceInfo>,
        corrected_from: Option<String>,
    ) -> &HistoryEntry {
        debug!(%role, text_len = text.len(), source = ?source_info, "Appending history entry");
        self.entries.push(HistoryEntry {
            role,
            text,
            content_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source_info,
            corrected_from,
        });

        if self.entries.len() > self.max_history {
            let excess = self.entries.len() - self.max_history;
            self.entries.drain(..excess);
            info!(removed = excess, kept = self.max_history, "Trimmed old history entries");
        }

        let last = self.entries.len() - 1;
        &self.entries[last]
    }

    /// Owned copy of the transcript in insertion order.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Number of role labels corrected since this history was created.
    pub fn corrections(&self) -> usize {
        self.corrections
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
}

/// Drop leading entries until the first `USER` entry.
///
/// Used when replaying a transcript to the model so the replay never opens
/// with an assistant turn that has no user context before it.
pub fn leading_user_trim(entries: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    match entries.iter().position(|e| e.role == Role::User) {
        Some(first_user) => entries.into_iter().skip(first_user).collect(),
        None => Vec::new(),
    }
}
