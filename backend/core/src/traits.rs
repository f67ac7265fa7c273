use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A capability the speech model can invoke by name.
///
/// Implementations are registered once at startup in a
/// [`ToolRegistry`](crate::tools::ToolRegistry) and never change afterwards.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool (e.g. "trackOrderTool").
    fn name(&self) -> &str;

    /// Description for the model prompt.
    fn description(&self) -> &str;

    /// Short progress label shown while the tool runs.
    fn short_description(&self) -> &str;

    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> Value;

    /// Execute the tool with the given input.
    async fn execute(&self, content: Value) -> anyhow::Result<ToolOutput>;
}

/// Result pair produced by a tool: what the model sees, and an optional
/// payload rendered only by the client UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub model_result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_result: Option<Value>,
}

impl ToolOutput {
    pub fn new(model_result: Value, ui_result: Value) -> Self {
        Self {
            model_result,
            ui_result: Some(ui_result),
        }
    }

    pub fn model_only(model_result: Value) -> Self {
        Self {
            model_result,
            ui_result: None,
        }
    }

    /// An `{"error": message}` model result with no UI payload.
    pub fn error(message: impl Into<String>) -> Self {
        Self::model_only(json!({ "error": message.into() }))
    }

    pub fn is_error(&self) -> bool {
        self.model_result.get("error").is_some()
    }

    pub fn error_message(&self) -> Option<String> {
        self.model_result.get("error").map(|e| match e.as_str() {
            Some(s) => s.to_string(),
            None => e.to_string(),
        })
    }
}

/// Schema descriptor advertised to the model and the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub short_description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            short_description: tool.short_description().to_string(),
            input_schema: tool.input_schema(),
        }
    }

    /// Wire form used in `promptStart.toolConfiguration.tools` and the client
    /// `init` event. The schema travels as a JSON string.
    pub fn to_model_config(&self) -> Value {
        json!({
            "toolSpec": {
                "name": self.name,
                "description": self.description,
                "inputSchema": {
                    "json": self.input_schema.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_is_flagged() {
        let out = ToolOutput::error("boom");
        assert!(out.is_error());
        assert_eq!(out.error_message().as_deref(), Some("boom"));
        assert!(out.ui_result.is_none());

        let ok = ToolOutput::new(json!({"status": "ok"}), json!({"type": "card"}));
        assert!(!ok.is_error());
        assert!(ok.error_message().is_none());
    }

    #[test]
    fn model_config_embeds_schema_as_string() {
        let spec = ToolSpec {
            name: "x".into(),
            description: "does x".into(),
            short_description: "doing x".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        };
        let cfg = spec.to_model_config();
        let raw = cfg["toolSpec"]["inputSchema"]["json"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed["type"], "object");
        assert!(cfg["toolSpec"].get("shortDescription").is_none());
    }
}
