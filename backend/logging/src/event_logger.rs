//! Conversation Event Logger
//!
//! One structured record per history append, tool call and tool failure,
//! emitted under the [`EVENT_TARGET`] tracing target so the NDJSON file can
//! be filtered down to the conversation trail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

pub const EVENT_TARGET: &str = "conversation_events";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    HistoryAppend {
        role: String,
        content: String,
        content_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    ToolCall {
        tool_name: String,
        arguments_json: String,
    },
    ToolResult {
        tool_name: String,
        success: bool,
    },
    Error {
        error_msg: String,
    },
}

impl ConversationEvent {
    fn redacted(mut self) -> Self {
        match &mut self {
            ConversationEvent::HistoryAppend { content, .. } => {
                *content = redact_sensitive_data(content);
            }
            ConversationEvent::ToolCall { arguments_json, .. } => {
                *arguments_json = redact_sensitive_data(arguments_json);
            }
            ConversationEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            ConversationEvent::ToolResult { .. } => {}
        }
        self
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ConversationEvent,
}

impl EventLogEntry {
    pub fn new(session_id: &str, event: ConversationEvent) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            event: event.redacted(),
        }
    }
}

pub struct EventLogger;

impl EventLogger {
    /// Redact and emit one conversation event.
    pub fn log_event(session_id: &str, event: ConversationEvent) {
        let entry = EventLogEntry::new(session_id, event);
        let record = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: EVENT_TARGET, session_id, record = %record, "Conversation event");
    }
}
