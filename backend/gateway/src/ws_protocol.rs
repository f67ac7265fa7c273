//! Client-side wire protocol of the `/ws` endpoint.
//!
//! Inbound text frames are either `{"event": {<kind>: {...}}}` envelopes or
//! the bare commands `start_audio` / `stop_audio`. Binary frames carry raw
//! PCM and never pass through here.

use bytes::Bytes;
use serde_json::Value;
use sonicdesk_core::event;
use sonicdesk_core::CoreError;

/// A parsed inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    StartAudio,
    StopAudio,
    /// `ui_interaction` body, e.g. `{"type": "button_click", ...}`.
    UiInteraction(Value),
    /// The whole `toolUse` envelope.
    ToolUse(Value),
    TextInput(String),
    /// A well-formed envelope of a kind the gateway does not handle.
    Unknown(String),
}

/// Outbound message for the client socket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Text(String),
    Binary(Bytes),
    /// Ask the writer to close the socket.
    Close,
}

impl ClientMessage {
    pub fn json(value: &Value) -> Self {
        ClientMessage::Text(value.to_string())
    }

    /// The parsed JSON payload of a text message.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            ClientMessage::Text(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }
}

fn command(text: &str) -> Option<ClientFrame> {
    match text.trim() {
        "start_audio" => Some(ClientFrame::StartAudio),
        "stop_audio" => Some(ClientFrame::StopAudio),
        _ => None,
    }
}

/// Parse one inbound text frame.
pub fn parse_text_frame(text: &str) -> Result<ClientFrame, CoreError> {
    if let Some(frame) = command(text) {
        return Ok(frame);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| CoreError::MalformedMessage(format!("invalid JSON: {e}")))?;

    if let Value::String(s) = &value {
        return command(s).ok_or_else(|| CoreError::MalformedMessage(format!("unknown command: {s}")));
    }

    let kind = event::event_kind(&value)
        .ok_or_else(|| CoreError::MalformedMessage("missing event envelope".into()))?
        .to_string();

    let frame = match kind.as_str() {
        "ui_interaction" => ClientFrame::UiInteraction(value["event"]["ui_interaction"].clone()),
        "toolUse" => ClientFrame::ToolUse(value),
        "textInput" => ClientFrame::TextInput(
            value["event"]["textInput"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        ),
        _ => ClientFrame::Unknown(kind),
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_and_quoted_commands() {
        assert_eq!(parse_text_frame("start_audio").unwrap(), ClientFrame::StartAudio);
        assert_eq!(parse_text_frame("stop_audio\n").unwrap(), ClientFrame::StopAudio);
        assert_eq!(parse_text_frame("\"start_audio\"").unwrap(), ClientFrame::StartAudio);
        assert!(parse_text_frame("\"dance\"").is_err());
    }

    #[test]
    fn envelopes() {
        let ui = json!({"event": {"ui_interaction": {"type": "button_click", "id": "b1"}}});
        assert_eq!(
            parse_text_frame(&ui.to_string()).unwrap(),
            ClientFrame::UiInteraction(json!({"type": "button_click", "id": "b1"}))
        );

        let text = json!({"event": {"textInput": {"content": "hi there"}}});
        assert_eq!(
            parse_text_frame(&text.to_string()).unwrap(),
            ClientFrame::TextInput("hi there".into())
        );

        let tool = json!({"event": {"toolUse": {"toolName": "x", "toolUseId": "t"}}});
        assert_eq!(parse_text_frame(&tool.to_string()).unwrap(), ClientFrame::ToolUse(tool));

        let other = json!({"event": {"ping": {}}});
        assert_eq!(
            parse_text_frame(&other.to_string()).unwrap(),
            ClientFrame::Unknown("ping".into())
        );
    }

    #[test]
    fn malformed_frames() {
        for bad in ["{not json", "[1,2]", "{\"event\": 3}", "42"] {
            match parse_text_frame(bad) {
                Err(CoreError::MalformedMessage(_)) => {}
                other => panic!("{bad}: expected malformed, got {other:?}"),
            }
        }
    }

    #[test]
    fn client_message_json() {
        let msg = ClientMessage::json(&json!({"a": 1}));
        assert_eq!(msg.as_json(), Some(json!({"a": 1})));
        assert_eq!(ClientMessage::Close.as_json(), None);
    }
}
