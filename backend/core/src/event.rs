//! Wire events exchanged with the speech model and the browser client.
//!
//! Every event travels as a `{"event": {<kind>: {...}}}` envelope. The
//! builders here produce model-bound events (session/prompt lifecycle,
//! content framing, audio and tool results) and client-bound notifications.

use serde_json::{json, Value};

/// Output audio sample rate negotiated with the model.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Input audio sample rate expected from the client microphone.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Text marker the model embeds in a `textOutput` when the user barges in.
pub const BARGE_IN_MARKER: &str = r#"{"interrupted":true}"#;

/// `sessionStart` inference parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            top_p: 0.9,
            temperature: 0.7,
        }
    }
}

/// Wrap an event body under its kind.
pub fn envelope(kind: &str, body: Value) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert(kind.to_string(), body);
    json!({ "event": Value::Object(inner) })
}

/// The kind of an enveloped event (its single key under `event`).
pub fn event_kind(event: &Value) -> Option<&str> {
    event
        .get("event")?
        .as_object()?
        .keys()
        .next()
        .map(String::as_str)
}

/// The body of an enveloped event, if it is of the given kind.
pub fn event_body<'a>(event: &'a Value, kind: &str) -> Option<&'a Value> {
    event.get("event")?.get(kind)
}

/// Whether a text payload carries the barge-in marker, ignoring whitespace.
pub fn is_barge_in_text(text: &str) -> bool {
    if !text.contains("interrupted") {
        return false;
    }
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains(BARGE_IN_MARKER)
}

// ---------------------------------------------------------------------------
// Model-bound events
// ---------------------------------------------------------------------------

pub fn session_start(params: &InferenceParams) -> Value {
    envelope(
        "sessionStart",
        json!({
            "inferenceConfiguration": {
                "maxTokens": params.max_tokens,
                "topP": params.top_p,
                "temperature": params.temperature,
            }
        }),
    )
}

/// `promptStart` with output negotiation and the full tool catalog.
pub fn prompt_start(prompt_name: &str, voice_id: &str, tools: Vec<Value>) -> Value {
    envelope(
        "promptStart",
        json!({
            "promptName": prompt_name,
            "textOutputConfiguration": { "mediaType": "text/plain" },
            "audioOutputConfiguration": {
                "mediaType": "audio/lpcm",
                "sampleRateHertz": OUTPUT_SAMPLE_RATE,
                "sampleSizeBits": 16,
                "channelCount": 1,
                "voiceId": voice_id,
                "encoding": "base64",
                "audioType": "SPEECH",
            },
            "toolUseOutputConfiguration": { "mediaType": "application/json" },
            "toolConfiguration": { "tools": tools },
        }),
    )
}

pub fn text_content_start(prompt_name: &str, content_name: &str, role: &str, interactive: bool) -> Value {
    envelope(
        "contentStart",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "type": "TEXT",
            "interactive": interactive,
            "role": role,
            "textInputConfiguration": { "mediaType": "text/plain" },
        }),
    )
}

pub fn text_input(prompt_name: &str, content_name: &str, text: &str) -> Value {
    envelope(
        "textInput",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "content": text,
        }),
    )
}

pub fn content_end(prompt_name: &str, content_name: &str) -> Value {
    envelope(
        "contentEnd",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
        }),
    )
}

/// The three events of a complete text turn, in send order.
pub fn text_turn(prompt_name: &str, content_name: &str, role: &str, text: &str, interactive: bool) -> [Value; 3] {
    [
        text_content_start(prompt_name, content_name, role, interactive),
        text_input(prompt_name, content_name, text),
        content_end(prompt_name, content_name),
    ]
}

pub fn audio_content_start(prompt_name: &str, content_name: &str) -> Value {
    envelope(
        "contentStart",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "type": "AUDIO",
            "interactive": true,
            "role": "USER",
            "audioInputConfiguration": {
                "mediaType": "audio/lpcm",
                "sampleRateHertz": INPUT_SAMPLE_RATE,
                "sampleSizeBits": 16,
                "channelCount": 1,
                "audioType": "SPEECH",
                "encoding": "base64",
            },
        }),
    )
}

pub fn audio_input(prompt_name: &str, content_name: &str, base64_audio: &str) -> Value {
    envelope(
        "audioInput",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "content": base64_audio,
        }),
    )
}

/// Opens the tool-result content block answering `tool_use_id`.
pub fn tool_content_start(
    prompt_name: &str,
    content_name: &str,
    tool_use_id: &str,
    short_description: &str,
) -> Value {
    envelope(
        "contentStart",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "type": "TOOL",
            "role": "TOOL",
            "interactive": false,
            "shortDescription": short_description,
            "toolResultInputConfiguration": {
                "toolUseId": tool_use_id,
                "type": "TEXT",
                "textInputConfiguration": { "mediaType": "text/plain" },
            },
        }),
    )
}

/// `toolResult` whose content is the serialized model result.
pub fn tool_result(prompt_name: &str, content_name: &str, model_result: &Value) -> Value {
    envelope(
        "toolResult",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "content": model_result.to_string(),
        }),
    )
}

/// How a tool content block ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ToolUse,
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::ToolUse => "TOOL_USE",
            StopReason::Error => "ERROR",
        }
    }
}

pub fn tool_content_end(prompt_name: &str, content_name: &str, stop_reason: StopReason) -> Value {
    envelope(
        "contentEnd",
        json!({
            "promptName": prompt_name,
            "contentName": content_name,
            "type": "TOOL",
            "stopReason": stop_reason.as_str(),
        }),
    )
}

pub fn prompt_end(prompt_name: &str) -> Value {
    envelope("promptEnd", json!({ "promptName": prompt_name }))
}

pub fn session_end() -> Value {
    envelope("sessionEnd", json!({}))
}

// ---------------------------------------------------------------------------
// Client-bound events
// ---------------------------------------------------------------------------

/// Connect-time catalog sent to the client.
pub fn init(tool_configs: Vec<Value>) -> Value {
    envelope("init", json!({ "toolConfigs": tool_configs }))
}

pub fn tool_ui_output(payload: Value) -> Value {
    envelope("toolUiOutput", payload)
}

/// Tool execution progress stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProgress {
    Started,
    Completed,
}

impl ToolProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolProgress::Started => "started",
            ToolProgress::Completed => "completed",
        }
    }
}

pub fn tool_progress(tool_name: &str, stage: ToolProgress) -> Value {
    tool_ui_output(json!({
        "type": "tool_exec_progress",
        "content": {
            "status": stage.as_str(),
            "toolName": tool_name,
        }
    }))
}

/// `completed` progress for a tool that failed. The client sees the usual
/// status; the `error` field lets observers tell the outcome apart.
pub fn tool_progress_failed(tool_name: &str, message: &str) -> Value {
    let mut ev = tool_progress(tool_name, ToolProgress::Completed);
    ev["event"]["toolUiOutput"]["content"]["error"] = Value::String(message.to_string());
    ev
}

pub fn barge_in() -> Value {
    tool_ui_output(json!({
        "type": "barge_in",
        "content": { "status": "interrupted" }
    }))
}
