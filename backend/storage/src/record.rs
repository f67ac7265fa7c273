//! Stored conversation document: formatting, keys and integrity checks.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sonicdesk_core::{HistoryEntry, Role, RoleClassifier, SourceInfo};
use tracing::{info, warn};

use crate::sink::SessionMetadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMessage {
    pub role: Role,
    pub text: String,
    pub content_name: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_info: Option<SourceInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tools_used: Vec<String>,
    pub role_corrections_made: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub session_id: String,
    pub metadata: RecordMetadata,
    pub conversation: Vec<RecordMessage>,
}

/// Build the stored document for a finished session.
pub fn format_record(session_id: &str, history: &[HistoryEntry], meta: &SessionMetadata) -> ConversationRecord {
    let user_messages = history.iter().filter(|e| e.role == Role::User).count();
    let assistant_messages = history.len() - user_messages;
    let role_corrections_made = history.iter().filter(|e| e.corrected_from.is_some()).count();
    let tools_used = tools_used(history);

    info!(
        session_id,
        total = history.len(),
        user = user_messages,
        assistant = assistant_messages,
        tools = tools_used.len(),
        "Conversation statistics"
    );

    ConversationRecord {
        session_id: session_id.to_string(),
        metadata: RecordMetadata {
            start_time: meta.start_time,
            end_time: meta.end_time,
            duration_seconds: meta.duration_seconds,
            message_count: history.len(),
            user_messages,
            assistant_messages,
            tools_used,
            role_corrections_made,
        },
        conversation: history
            .iter()
            .map(|e| RecordMessage {
                role: e.role,
                text: e.text.clone(),
                content_name: e.content_id.clone(),
                timestamp: e.timestamp_rfc3339(),
                source_info: e.source_info.clone(),
            })
            .collect(),
    }
}

/// Tool names mentioned by tool-related entries (`"... tool: <name>"`).
pub fn tools_used(history: &[HistoryEntry]) -> Vec<String> {
    let mut names = BTreeSet::new();
    for entry in history {
        let is_tool_event = entry
            .source_info
            .as_ref()
            .and_then(|s| s.event_type.as_deref())
            .is_some_and(|t| t == "toolUse" || t == "toolResult");
        if !is_tool_event {
            continue;
        }
        let lower = entry.text.to_lowercase();
        if let Some(pos) = lower.find("tool:") {
            let rest = entry.text.get(pos + "tool:".len()..).unwrap_or_default();
            if let Some(name) = rest.split_whitespace().next() {
                names.insert(name.to_string());
            }
        }
    }
    names.into_iter().collect()
}

/// Hierarchical storage key:
/// `<prefix>/<YYYY>/<MM>/<DD>/conversation_<YYYYMMDD>_<HHMMSS>_<session>.json`.
pub fn object_key(prefix: &str, session_id: &str, at: DateTime<Utc>) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = format!(
        "conversation_{}_{}.json",
        at.format("%Y%m%d_%H%M%S"),
        session_id
    );
    if prefix.is_empty() {
        format!("{}/{name}", at.format("%Y/%m/%d"))
    } else {
        format!("{prefix}/{}/{name}", at.format("%Y/%m/%d"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDistribution {
    pub user: usize,
    pub assistant: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub role_distribution: RoleDistribution,
    pub tools_used: usize,
}

impl ValidationReport {
    fn fail(&mut self, issue: String) {
        self.is_valid = false;
        self.issues.push(issue);
    }
}

/// Integrity check of a stored document, as raw JSON.
///
/// Empty message text is reported as an issue without failing the record.
pub fn validate_record(record: &Value) -> ValidationReport {
    let classifier = RoleClassifier::new();
    let mut report = ValidationReport {
        is_valid: true,
        issues: Vec::new(),
        role_distribution: RoleDistribution::default(),
        tools_used: 0,
    };

    for field in ["sessionId", "metadata", "conversation"] {
        if record.get(field).is_none() {
            report.fail(format!("Missing required field: {field}"));
        }
    }

    let messages = record["conversation"].as_array().cloned().unwrap_or_default();
    for (i, msg) in messages.iter().enumerate() {
        let n = i + 1;
        let Some(role) = msg.get("role").and_then(Value::as_str) else {
            report.fail(format!("Message {n} missing role field"));
            continue;
        };
        match Role::parse(role) {
            Some(Role::User) => report.role_distribution.user += 1,
            Some(Role::Assistant) => report.role_distribution.assistant += 1,
            None => {
                classifier.validate(role);
                report.role_distribution.invalid += 1;
                report.fail(format!("Message {n} has invalid role: {role}"));
            }
        }
        if msg["text"].as_str().unwrap_or_default().trim().is_empty() {
            report.issues.push(format!("Message {n} has empty text content"));
        }
    }

    let meta = &record["metadata"];
    let declared = |key: &str| meta[key].as_u64().unwrap_or(0) as usize;
    let checks = [
        ("User message", declared("userMessages"), report.role_distribution.user),
        ("Assistant message", declared("assistantMessages"), report.role_distribution.assistant),
        ("Total message", declared("messageCount"), messages.len()),
    ];
    for (label, declared, actual) in checks {
        if declared != actual {
            report.fail(format!("{label} count mismatch: declared {declared}, actual {actual}"));
        }
    }
    report.tools_used = meta["toolsUsed"].as_array().map_or(0, Vec::len);

    if !report.is_valid {
        warn!(issues = ?report.issues, "Conversation record failed validation");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use sonicdesk_core::ConversationHistory;

    fn sample() -> (Vec<HistoryEntry>, SessionMetadata) {
        let mut history = ConversationHistory::new(50);
        history.append("USER", "where is my order", Some(SourceInfo::new("websocket", Some("textInput"), true)));
        history.append(
            "USER",
            "User requested tool: trackOrderTool",
            Some(SourceInfo::new("websocket", Some("toolUse"), true)),
        );
        history.append(
            "ASSISTANT",
            "Tool trackOrderTool executed successfully",
            Some(SourceInfo::new("websocket", Some("toolResult"), true)),
        );
        history.append("SYSTEM", "it ships tomorrow", None);
        let start = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 4, 5, 8, 7).unwrap();
        (history.snapshot(), SessionMetadata::new(start, end))
    }

    #[test]
    fn record_statistics() {
        let (history, meta) = sample();
        let record = format_record("s-1", &history, &meta);
        assert_eq!(record.metadata.message_count, 4);
        assert_eq!(record.metadata.user_messages, 2);
        assert_eq!(record.metadata.assistant_messages, 2);
        assert_eq!(record.metadata.duration_seconds, 120);
        assert_eq!(record.metadata.tools_used, vec!["trackOrderTool"]);
        assert_eq!(record.metadata.role_corrections_made, 1);
        assert_eq!(record.conversation[0].content_name, history[0].content_id);
    }

    #[test]
    fn key_is_hierarchical() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            object_key("conversations/", "abc", at),
            "conversations/2025/03/04/conversation_20250304_050607_abc.json"
        );
        assert_eq!(object_key("", "abc", at), "2025/03/04/conversation_20250304_050607_abc.json");
    }

    #[test]
    fn formatted_record_validates() {
        let (history, meta) = sample();
        let value = serde_json::to_value(format_record("s-1", &history, &meta)).unwrap();
        let report = validate_record(&value);
        assert!(report.is_valid, "{:?}", report.issues);
        assert_eq!(report.role_distribution.user, 2);
        assert_eq!(report.tools_used, 1);
    }

    #[test]
    fn validation_reports_bad_roles_and_counts() {
        let value = json!({
            "sessionId": "s",
            "metadata": {"messageCount": 3, "userMessages": 1, "assistantMessages": 1},
            "conversation": [
                {"role": "USER", "text": "hi"},
                {"role": "SYSTEM", "text": "x"},
                {"text": "no role"},
            ]
        });
        let report = validate_record(&value);
        assert!(!report.is_valid);
        assert_eq!(report.role_distribution.invalid, 1);
        assert!(report.issues.iter().any(|i| i.contains("invalid role: SYSTEM")));
        assert!(report.issues.iter().any(|i| i.contains("Message 3 missing role")));
        assert!(report.issues.iter().any(|i| i.contains("Assistant message count mismatch")));
    }

    #[test]
    fn empty_text_is_an_issue_but_not_invalid() {
        let value = json!({
            "sessionId": "s",
            "metadata": {"messageCount": 1, "userMessages": 1, "assistantMessages": 0},
            "conversation": [{"role": "USER", "text": "  "}]
        });
        let report = validate_record(&value);
        assert!(report.is_valid);
        assert_eq!(report.issues.len(), 1);

        let missing = validate_record(&json!({}));
        assert!(!missing.is_valid);
        assert!(missing.issues.iter().any(|i| i.contains("sessionId")));
    }
}
