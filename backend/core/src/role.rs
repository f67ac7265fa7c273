//! Conversation role attribution.
//!
//! Every transcript entry is attributed to exactly one of two roles. The
//! classifier maps an event origin (event kind, envelope shape, or free-form
//! source label) to a role and never fails: anything it cannot place falls
//! back to [`DEFAULT_ROLE`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// A conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
}

/// Role used whenever classification is ambiguous or a label is invalid.
pub const DEFAULT_ROLE: Role = Role::Assistant;

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }

    /// Parse an exact wire label (`"USER"` / `"ASSISTANT"`).
    pub fn parse(label: &str) -> Option<Role> {
        match label {
            "USER" => Some(Role::User),
            "ASSISTANT" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn all() -> [Role; 2] {
        [Role::User, Role::Assistant]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event kinds originating from the user side of the conversation.
const USER_EVENT_KINDS: &[&str] = &[
    "textInput",
    "ui_interaction",
    "toolUse",
    "audio_transcription",
    "button_click",
];

/// Event kinds originating from the model side of the conversation.
const ASSISTANT_EVENT_KINDS: &[&str] = &[
    "textOutput",
    "toolResult",
    "audio_response",
    "contentStart",
    "contentEnd",
];

/// Envelope keys checked, in order, when no explicit event kind is given.
const ENVELOPE_KEY_ORDER: &[&str] = &[
    "textInput",
    "textOutput",
    "toolUse",
    "toolResult",
    "ui_interaction",
    "contentStart",
    "contentEnd",
];

const USER_SOURCE_KEYWORDS: &[&str] = &["user", "input", "ui", "button", "click"];
const ASSISTANT_SOURCE_KEYWORDS: &[&str] = &["assistant", "output", "response", "system"];

/// Summary of the classification table, for diagnostics endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStats {
    pub total_rules: usize,
    pub user_event_types: Vec<&'static str>,
    pub assistant_event_types: Vec<&'static str>,
    pub valid_roles: Vec<&'static str>,
    pub default_role: &'static str,
}

/// Stateless role classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleClassifier;

impl RoleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Role for an exact event kind, if the kind is in the static table.
    pub fn role_for_event(event_type: &str) -> Option<Role> {
        if USER_EVENT_KINDS.contains(&event_type) {
            Some(Role::User)
        } else if ASSISTANT_EVENT_KINDS.contains(&event_type) {
            Some(Role::Assistant)
        } else {
            None
        }
    }

    /// Resolve a role from whatever origin information is available.
    ///
    /// Resolution order: explicit event kind, event kind inferred from a
    /// `{"event": {...}}` envelope, keywords in the source label, default.
    pub fn classify(
        &self,
        source: Option<&str>,
        event_type: Option<&str>,
        content: Option<&Value>,
    ) -> Role {
        if let Some(role) = event_type.and_then(Self::role_for_event) {
            debug!(?event_type, %role, "Classified by event type");
            return role;
        }

        if let Some(inferred) = content.and_then(Self::infer_event_type) {
            if let Some(role) = Self::role_for_event(inferred) {
                debug!(event_type = inferred, %role, "Classified by inferred event type");
                return role;
            }
        }

        if let Some(role) = source.and_then(Self::classify_by_source) {
            debug!(?source, %role, "Classified by source");
            return role;
        }

        warn!(
            ?source,
            ?event_type,
            default = %DEFAULT_ROLE,
            "Could not classify message role; using default"
        );
        DEFAULT_ROLE
    }

    /// Classify a full client/model event envelope.
    pub fn classify_event(&self, event: &Value) -> Role {
        if let Some(body) = event.get("event").and_then(Value::as_object) {
            let hit = USER_EVENT_KINDS
                .iter()
                .chain(ASSISTANT_EVENT_KINDS.iter())
                .find(|kind| body.contains_key(**kind));
            if let Some(kind) = hit {
                if let Some(role) = Self::role_for_event(kind) {
                    return role;
                }
            }
        }
        self.classify(Some("websocket"), None, Some(event))
    }

    fn infer_event_type(content: &Value) -> Option<&str> {
        let obj = content.as_object()?;
        if let Some(body) = obj.get("event").and_then(Value::as_object) {
            if let Some(kind) = ENVELOPE_KEY_ORDER.iter().find(|k| body.contains_key(**k)) {
                return Some(*kind);
            }
        }
        obj.get("type")
            .and_then(Value::as_str)
            .filter(|t| Self::role_for_event(t).is_some())
    }

    fn classify_by_source(source: &str) -> Option<Role> {
        let lower = source.to_lowercase();
        if USER_SOURCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Some(Role::User);
        }
        if ASSISTANT_SOURCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Some(Role::Assistant);
        }
        None
    }

    /// Whether `label` is one of the two valid role labels.
    pub fn validate(&self, label: &str) -> bool {
        let valid = Role::parse(label).is_some();
        if !valid {
            warn!(label, "Role validation failed");
        }
        valid
    }

    /// Return the role named by `label`, or the default role if invalid.
    pub fn correct(&self, label: &str) -> Role {
        match Role::parse(label) {
            Some(role) => role,
            None => {
                warn!(label, default = %DEFAULT_ROLE, "Correcting invalid role to default");
                DEFAULT_ROLE
            }
        }
    }

    pub fn stats(&self) -> ClassificationStats {
        ClassificationStats {
            total_rules: USER_EVENT_KINDS.len() + ASSISTANT_EVENT_KINDS.len(),
            user_event_types: USER_EVENT_KINDS.to_vec(),
            assistant_event_types: ASSISTANT_EVENT_KINDS.to_vec(),
            valid_roles: Role::all().iter().map(Role::as_str).collect(),
            default_role: DEFAULT_ROLE.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_labels_are_corrected_to_assistant() {
        let c = RoleClassifier::new();
        for label in ["SYSTEM", "TOOL", "user", "", "Assistant", "UNKNOWN"] {
            assert!(!c.validate(label), "{label} should be invalid");
            assert_eq!(c.correct(label), Role::Assistant);
        }
        assert_eq!(c.correct("USER"), Role::User);
        assert!(c.validate("ASSISTANT"));
    }

    #[test]
    fn explicit_event_type_wins() {
        let c = RoleClassifier::new();
        assert_eq!(c.classify(Some("assistant"), Some("textInput"), None), Role::User);
        assert_eq!(c.classify(Some("user"), Some("toolResult"), None), Role::Assistant);
        assert_eq!(c.classify(None, Some("button_click"), None), Role::User);
    }

    #[test]
    fn infers_from_envelope_then_type_field() {
        let c = RoleClassifier::new();
        let envelope = json!({"event": {"ui_interaction": {"type": "button_click"}}});
        assert_eq!(c.classify(None, None, Some(&envelope)), Role::User);

        let typed = json!({"type": "audio_transcription"});
        assert_eq!(c.classify(None, None, Some(&typed)), Role::User);

        let unknown = json!({"event": {"somethingElse": {}}});
        assert_eq!(c.classify(None, None, Some(&unknown)), Role::Assistant);
    }

    #[test]
    fn falls_back_to_source_keywords() {
        let c = RoleClassifier::new();
        assert_eq!(c.classify(Some("UI-Button"), None, None), Role::User);
        assert_eq!(c.classify(Some("model_response"), None, None), Role::Assistant);
        assert_eq!(c.classify(Some("websocket"), Some("mystery"), None), Role::Assistant);
        assert_eq!(c.classify(None, None, None), Role::Assistant);
    }

    #[test]
    fn classify_event_uses_envelope_key() {
        let c = RoleClassifier::new();
        let tool_use = json!({"event": {"toolUse": {"toolName": "x"}}});
        assert_eq!(c.classify_event(&tool_use), Role::User);
        let output = json!({"event": {"textOutput": {"content": "hi"}}});
        assert_eq!(c.classify_event(&output), Role::Assistant);
    }

    #[test]
    fn role_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("USER"));
        let back: Role = serde_json::from_value(json!("ASSISTANT")).unwrap();
        assert_eq!(back, Role::Assistant);
    }

    #[test]
    fn stats_cover_both_tables() {
        let stats = RoleClassifier::new().stats();
        assert_eq!(stats.total_rules, 10);
        assert!(stats.user_event_types.contains(&"toolUse"));
        assert_eq!(stats.default_role, "ASSISTANT");
    }
}
