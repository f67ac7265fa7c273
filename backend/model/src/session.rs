//! One bidirectional conversation with the speech model.
//!
//! A [`ModelSession`] frames outbound events, and owns a single background
//! receive loop that splits inbound frames into an audio queue and an event
//! queue. Tool-use requests from the model are answered inline by that loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use sonicdesk_core::event::{self, StopReason, ToolProgress};
use sonicdesk_core::{HistoryEntry, ToolRegistry};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ModelError;
use crate::settings::ModelSettings;
use crate::transport::{ModelConnector, ModelTransport};

/// How long `end()` waits for the receive loop to drain before aborting it.
const RECEIVE_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle of a model session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Ending,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Decoded model audio, tagged with the barge-in epoch it arrived in.
///
/// A chunk whose epoch is older than [`ModelSession::barge_in_epoch`] was
/// queued before an interruption and must not be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub epoch: u64,
    pub pcm: Bytes,
}

/// Receiving ends of the two queues fed by the receive loop.
///
/// Both close when the loop exits.
pub struct ModelQueues {
    pub audio: mpsc::UnboundedReceiver<AudioChunk>,
    pub events: mpsc::UnboundedReceiver<Value>,
}

struct Shared {
    prompt_name: String,
    settings: ModelSettings,
    tools: Arc<ToolRegistry>,
    state: Mutex<SessionState>,
    barge_in: AtomicBool,
    barge_in_epoch: AtomicU64,
    audio_content_name: Mutex<Option<String>>,
    transport: OnceLock<Arc<dyn ModelTransport>>,
}

pub struct ModelSession {
    shared: Arc<Shared>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ModelSession {
    pub fn new(settings: ModelSettings, tools: Arc<ToolRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                prompt_name: Uuid::new_v4().to_string(),
                settings,
                tools,
                state: Mutex::new(SessionState::Idle),
                barge_in: AtomicBool::new(false),
                barge_in_epoch: AtomicU64::new(0),
                audio_content_name: Mutex::new(None),
                transport: OnceLock::new(),
            }),
            receive_task: Mutex::new(None),
        }
    }

    pub fn prompt_name(&self) -> &str {
        &self.shared.prompt_name
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Whether the model has signalled an interruption that is still in effect.
    pub fn is_barge_in(&self) -> bool {
        self.shared.barge_in.load(Ordering::SeqCst)
    }

    /// Number of interruptions seen so far.
    pub fn barge_in_epoch(&self) -> u64 {
        self.shared.barge_in_epoch.load(Ordering::SeqCst)
    }

    /// Content id of the open audio input turn, if any.
    pub fn audio_content_name(&self) -> Option<String> {
        lock(&self.shared.audio_content_name).clone()
    }

    /// Open the stream, negotiate the session and start receiving.
    ///
    /// Sends `sessionStart`, `promptStart` with the tool catalog, then the
    /// system prompt as a `SYSTEM` text turn.
    pub async fn start(&self, connector: &dyn ModelConnector) -> Result<ModelQueues, ModelError> {
        {
            let mut state = lock(&self.shared.state);
            if *state != SessionState::Idle {
                warn!(state = ?*state, "Model session already started");
                return Err(ModelError::NotActive);
            }
            *state = SessionState::Starting;
        }

        let transport = match connector.connect(&self.shared.settings).await {
            Ok(t) => t,
            Err(e) => {
                self.shared.set_state(SessionState::Failed);
                return Err(e);
            }
        };
        let transport = self.shared.transport.get_or_init(|| transport).clone();

        if let Err(e) = self.negotiate().await {
            error!(error = %e, "Model session negotiation failed");
            self.shared.set_state(SessionState::Failed);
            let _ = transport.close().await;
            return Err(e);
        }
        self.shared.set_state(SessionState::Active);

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            receive_loop(shared, transport, audio_tx, event_tx).await;
        });
        *lock(&self.receive_task) = Some(handle);

        info!(prompt = %self.shared.prompt_name, "Model session started");
        Ok(ModelQueues {
            audio: audio_rx,
            events: event_rx,
        })
    }

    async fn negotiate(&self) -> Result<(), ModelError> {
        let shared = &self.shared;
        shared
            .send(&event::session_start(&shared.settings.inference))
            .await?;
        shared
            .send(&event::prompt_start(
                &shared.prompt_name,
                &shared.settings.voice_id,
                shared.tools.model_tool_configs(),
            ))
            .await?;
        let content_name = Uuid::new_v4().to_string();
        for ev in event::text_turn(
            &shared.prompt_name,
            &content_name,
            "SYSTEM",
            &shared.settings.system_prompt,
            true,
        ) {
            shared.send(&ev).await?;
        }
        Ok(())
    }

    /// Send a raw model-bound event.
    pub async fn send_event(&self, event: &Value) -> Result<(), ModelError> {
        self.shared.send(event).await
    }

    /// Send one PCM chunk as `audioInput`. No-op unless the session is active
    /// and an audio turn is open.
    pub async fn send_audio_chunk(&self, pcm: &[u8]) -> Result<(), ModelError> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(content_name) = self.audio_content_name() else {
            debug!("Dropping audio chunk outside an audio turn");
            return Ok(());
        };
        let encoded = BASE64.encode(pcm);
        self.shared
            .send(&event::audio_input(&self.shared.prompt_name, &content_name, &encoded))
            .await
    }

    /// Open a user audio turn under a fresh content id.
    pub async fn start_audio_input(&self) -> Result<String, ModelError> {
        if !self.is_active() {
            return Err(ModelError::NotActive);
        }
        let content_name = Uuid::new_v4().to_string();
        self.shared
            .send(&event::audio_content_start(&self.shared.prompt_name, &content_name))
            .await?;
        *lock(&self.shared.audio_content_name) = Some(content_name.clone());
        debug!(content = %content_name, "Audio input started");
        Ok(content_name)
    }

    /// Close the open audio turn, if there is one.
    pub async fn end_audio_input(&self) -> Result<(), ModelError> {
        let Some(content_name) = lock(&self.shared.audio_content_name).take() else {
            return Ok(());
        };
        self.shared
            .send(&event::content_end(&self.shared.prompt_name, &content_name))
            .await?;
        debug!(content = %content_name, "Audio input ended");
        Ok(())
    }

    /// Send a complete text turn under a fresh content id.
    pub async fn send_text_turn(&self, role: &str, text: &str, interactive: bool) -> Result<String, ModelError> {
        if !self.is_active() {
            return Err(ModelError::NotActive);
        }
        let content_name = Uuid::new_v4().to_string();
        for ev in event::text_turn(&self.shared.prompt_name, &content_name, role, text, interactive) {
            self.shared.send(&ev).await?;
        }
        Ok(content_name)
    }

    /// Replay earlier transcript entries as non-interactive text turns.
    pub async fn replay_history(&self, entries: &[HistoryEntry]) -> Result<usize, ModelError> {
        if !self.is_active() {
            return Err(ModelError::NotActive);
        }
        for entry in entries {
            for ev in event::text_turn(
                &self.shared.prompt_name,
                &entry.content_id,
                entry.role.as_str(),
                &entry.text,
                false,
            ) {
                self.shared.send(&ev).await?;
            }
        }
        if !entries.is_empty() {
            info!(count = entries.len(), "Replayed conversation history to model");
        }
        Ok(entries.len())
    }

    /// Send `promptEnd` and `sessionEnd`, then close the stream.
    ///
    /// Idempotent: does nothing unless the session is active.
    pub async fn end(&self) -> Result<(), ModelError> {
        {
            let mut state = lock(&self.shared.state);
            if *state != SessionState::Active {
                debug!(state = ?*state, "End requested on inactive model session");
                return Ok(());
            }
            *state = SessionState::Ending;
        }

        let mut result = Ok(());
        for ev in [event::prompt_end(&self.shared.prompt_name), event::session_end()] {
            if let Err(e) = self.shared.send(&ev).await {
                warn!(error = %e, "Failed to send session teardown event");
                result = Err(e);
                break;
            }
        }
        if let Some(transport) = self.shared.transport.get() {
            if let Err(e) = transport.close().await {
                warn!(error = %e, "Failed to close model transport");
            }
        }

        let handle = lock(&self.receive_task).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(RECEIVE_SHUTDOWN_GRACE, &mut handle).await.is_err() {
                debug!("Receive loop did not finish in time; aborting");
                handle.abort();
            }
        }

        {
            let mut state = lock(&self.shared.state);
            if *state != SessionState::Failed {
                *state = SessionState::Closed;
            }
        }
        info!(prompt = %self.shared.prompt_name, "Model session ended");
        result
    }
}

impl Drop for ModelSession {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.receive_task).take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        *lock(&self.state) = next;
    }

    async fn send(&self, event: &Value) -> Result<(), ModelError> {
        let transport = self.transport.get().ok_or(ModelError::NotActive)?;
        let frame = serde_json::to_string(event)?;
        transport.send(frame).await
    }
}

/// Per-loop view of who is speaking, used for transcript logging only.
#[derive(Default)]
struct Speaker {
    role: Option<String>,
    display_assistant_text: bool,
}

async fn receive_loop(
    shared: Arc<Shared>,
    transport: Arc<dyn ModelTransport>,
    audio_tx: mpsc::UnboundedSender<AudioChunk>,
    event_tx: mpsc::UnboundedSender<Value>,
) {
    let poll = shared.settings.receive_poll;
    let mut speaker = Speaker::default();

    loop {
        match shared.state() {
            SessionState::Active | SessionState::Ending => {}
            _ => break,
        }

        let frame = match tokio::time::timeout(poll, transport.recv()).await {
            Err(_) => continue,
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                let mut state = lock(&shared.state);
                if matches!(*state, SessionState::Ending | SessionState::Closed) {
                    *state = SessionState::Closed;
                    debug!("Model stream closed");
                } else {
                    *state = SessionState::Failed;
                    warn!("Model stream closed unexpectedly");
                }
                break;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Model transport failed");
                shared.set_state(SessionState::Failed);
                let _ = transport.close().await;
                break;
            }
        };

        if let Err(e) = dispatch(&shared, &frame, &mut speaker, &audio_tx, &event_tx).await {
            warn!(error = %e, "Failed to handle model frame; continuing");
        }
    }
    debug!("Receive loop stopped");
}

async fn dispatch(
    shared: &Shared,
    frame: &[u8],
    speaker: &mut Speaker,
    audio_tx: &mpsc::UnboundedSender<AudioChunk>,
    event_tx: &mpsc::UnboundedSender<Value>,
) -> anyhow::Result<()> {
    let value: Value = serde_json::from_slice(frame).context("invalid JSON frame from model")?;
    let Some(kind) = event::event_kind(&value).map(str::to_string) else {
        debug!("Ignoring model frame without an event envelope");
        return Ok(());
    };

    match kind.as_str() {
        "audioOutput" => {
            if shared.barge_in.load(Ordering::SeqCst) {
                debug!("Dropping audio frame during barge-in");
                return Ok(());
            }
            let content = value["event"]["audioOutput"]["content"]
                .as_str()
                .context("audioOutput without content")?;
            let pcm = BASE64.decode(content).context("invalid base64 audio")?;
            let _ = audio_tx.send(AudioChunk {
                epoch: shared.barge_in_epoch.load(Ordering::SeqCst),
                pcm: Bytes::from(pcm),
            });
        }
        "toolUse" => {
            let tool_use = value["event"]["toolUse"].clone();
            let _ = event_tx.send(value);
            tool_round_trip(shared, &tool_use, event_tx).await?;
        }
        "contentStart" => {
            let body = &value["event"]["contentStart"];
            let role = body["role"].as_str().map(str::to_string);
            if role.as_deref() == Some("ASSISTANT") && body["type"].as_str() == Some("AUDIO") {
                if shared.barge_in.swap(false, Ordering::SeqCst) {
                    debug!("New assistant audio turn; barge-in cleared");
                }
            }
            if let Some(fields) = body["additionalModelFields"].as_str() {
                let stage = serde_json::from_str::<Value>(fields)
                    .ok()
                    .and_then(|f| f["generationStage"].as_str().map(str::to_string));
                speaker.display_assistant_text = stage.as_deref() == Some("SPECULATIVE");
            }
            speaker.role = role;
            let _ = event_tx.send(value);
        }
        "textOutput" => {
            let text = value["event"]["textOutput"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let _ = event_tx.send(value);
            if event::is_barge_in_text(&text) {
                let epoch = shared.barge_in_epoch.fetch_add(1, Ordering::SeqCst) + 1;
                info!(epoch, "Barge-in detected; stopping audio output");
                shared.barge_in.store(true, Ordering::SeqCst);
                let _ = event_tx.send(event::barge_in());
            } else {
                match speaker.role.as_deref() {
                    Some("ASSISTANT") if speaker.display_assistant_text => {
                        debug!(role = "ASSISTANT", %text, "Model text");
                    }
                    Some("USER") => debug!(role = "USER", %text, "Model text"),
                    _ => {}
                }
            }
        }
        _ => {
            let _ = event_tx.send(value);
        }
    }
    Ok(())
}

/// Correlation ids for one model tool call, fixed for its whole round trip.
#[derive(Debug, Clone)]
struct PendingToolCall {
    tool_use_id: String,
    tool_name: String,
    prompt_name: String,
    content_name: String,
}

impl PendingToolCall {
    /// Missing `promptName` falls back to this session's prompt; the content
    /// id for the reply is minted here.
    fn from_tool_use(tool_use: &Value, session_prompt: &str) -> Self {
        let field = |key: &str| tool_use[key].as_str().unwrap_or_default().to_string();
        Self {
            tool_use_id: field("toolUseId"),
            tool_name: field("toolName"),
            prompt_name: tool_use["promptName"]
                .as_str()
                .unwrap_or(session_prompt)
                .to_string(),
            content_name: Uuid::new_v4().to_string(),
        }
    }

    fn content_start(&self, short_description: &str) -> Value {
        event::tool_content_start(
            &self.prompt_name,
            &self.content_name,
            &self.tool_use_id,
            short_description,
        )
    }

    fn result(&self, model_result: &Value) -> Value {
        event::tool_result(&self.prompt_name, &self.content_name, model_result)
    }

    fn content_end(&self, reason: StopReason) -> Value {
        event::tool_content_end(&self.prompt_name, &self.content_name, reason)
    }
}

/// Answer a model `toolUse` request.
///
/// Send order: progress(started), tool contentStart, then on success
/// progress(completed), toolResult, UI payload, contentEnd(TOOL_USE); on
/// failure toolResult{error}, progress(completed), contentEnd(ERROR).
async fn tool_round_trip(
    shared: &Shared,
    tool_use: &Value,
    event_tx: &mpsc::UnboundedSender<Value>,
) -> Result<(), ModelError> {
    let call = PendingToolCall::from_tool_use(tool_use, &shared.prompt_name);
    info!(tool = %call.tool_name, tool_use_id = %call.tool_use_id, "Processing model tool use");

    let _ = event_tx.send(event::tool_progress(&call.tool_name, ToolProgress::Started));

    let short_description = shared
        .tools
        .short_description(&call.tool_name)
        .unwrap_or_default();
    shared.send(&call.content_start(&short_description)).await?;

    let outcome = match parse_tool_content(&tool_use["content"]) {
        Ok(content) => shared
            .tools
            .execute(&call.tool_name, content)
            .await
            .map_err(|e| e.to_string()),
        Err(msg) => Err(msg),
    };

    match outcome {
        Ok(output) if !output.is_error() => {
            let _ = event_tx.send(event::tool_progress(&call.tool_name, ToolProgress::Completed));
            shared.send(&call.result(&output.model_result)).await?;
            if let Some(ui) = output.ui_result {
                let _ = event_tx.send(event::tool_ui_output(ui));
            }
            shared.send(&call.content_end(StopReason::ToolUse)).await?;
        }
        failed => {
            let error_result = match failed {
                Ok(output) => output.model_result,
                Err(msg) => json!({ "error": msg }),
            };
            warn!(tool = %call.tool_name, result = %error_result, "Tool use failed");
            shared.send(&call.result(&error_result)).await?;
            let message = error_result["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error_result.to_string());
            let _ = event_tx.send(event::tool_progress_failed(&call.tool_name, &message));
            shared.send(&call.content_end(StopReason::Error)).await?;
        }
    }
    Ok(())
}

/// Tool input arrives as a JSON string; objects are accepted as-is.
fn parse_tool_content(content: &Value) -> Result<Value, String> {
    match content {
        Value::String(raw) if raw.trim().is_empty() => Ok(json!({})),
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|e| format!("invalid tool input: {e}"))
        }
        Value::Null => Ok(json!({})),
        other => Ok(other.clone()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryPeer};
    use async_trait::async_trait;
    use sonicdesk_core::{Tool, ToolOutput};

    const WAIT: Duration = Duration::from_millis(500);

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        fn name(&self) -> &str {
            "lookupTool"
        }
        fn description(&self) -> &str {
            "looks things up"
        }
        fn short_description(&self) -> &str {
            "Looking up"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, content: Value) -> anyhow::Result<ToolOutput> {
            if content["fail"].as_bool() == Some(true) {
                anyhow::bail!("lookup failed");
            }
            Ok(ToolOutput::new(json!({"found": true}), json!({"type": "card"})))
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            receive_poll: Duration::from_millis(20),
            ..ModelSettings::default()
        }
    }

    async fn started() -> (ModelSession, ModelQueues, MemoryPeer) {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Lookup));
        let connector = MemoryConnector::new();
        let peer = connector.expect_session();
        let session = ModelSession::new(settings(), Arc::new(registry));
        let queues = session.start(&connector).await.unwrap();
        (session, queues, peer)
    }

    fn kinds(events: &[Value]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| event::event_kind(e).map(str::to_string))
            .collect()
    }

    async fn recv_event(queues: &mut ModelQueues) -> Value {
        tokio::time::timeout(WAIT, queues.events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn start_negotiates_session() {
        let (session, _queues, peer) = started().await;
        assert!(session.is_active());
        let sent = peer.drain_sent().await;
        assert_eq!(
            kinds(&sent),
            vec!["sessionStart", "promptStart", "contentStart", "textInput", "contentEnd"]
        );
        assert_eq!(sent[2]["event"]["contentStart"]["role"], "SYSTEM");
        let tools = &sent[1]["event"]["promptStart"]["toolConfiguration"]["tools"];
        assert_eq!(tools[0]["toolSpec"]["name"], "lookupTool");
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (session, _queues, _peer) = started().await;
        let connector = MemoryConnector::new();
        assert!(matches!(session.start(&connector).await, Err(ModelError::NotActive)));
    }

    #[tokio::test]
    async fn audio_is_framed_only_inside_a_turn() {
        let (session, _queues, peer) = started().await;
        peer.drain_sent().await;

        session.send_audio_chunk(&[1, 2, 3, 4]).await.unwrap();
        assert!(peer.drain_sent().await.is_empty());

        let content = session.start_audio_input().await.unwrap();
        session.send_audio_chunk(&[1, 2, 3, 4]).await.unwrap();
        session.end_audio_input().await.unwrap();
        let sent = peer.drain_sent().await;
        assert_eq!(kinds(&sent), vec!["contentStart", "audioInput", "contentEnd"]);
        assert_eq!(sent[0]["event"]["contentStart"]["contentName"], content.as_str());
        assert_eq!(sent[1]["event"]["audioInput"]["content"], BASE64.encode([1u8, 2, 3, 4]));
        assert!(session.audio_content_name().is_none());
    }

    #[tokio::test]
    async fn audio_output_is_decoded_onto_audio_queue() {
        let (_session, mut queues, peer) = started().await;
        peer.push_event(json!({"event": {"audioOutput": {"content": BASE64.encode([9u8, 8, 7])}}}));
        let chunk = tokio::time::timeout(WAIT, queues.audio.recv()).await.unwrap().unwrap();
        assert_eq!(&chunk.pcm[..], &[9, 8, 7]);
        assert_eq!(chunk.epoch, 0);
    }

    #[tokio::test]
    async fn barge_in_drops_audio_until_next_assistant_audio_turn() {
        let (session, mut queues, peer) = started().await;
        peer.push_event(json!({"event": {"textOutput": {"content": "{ \"interrupted\" : true }"}}}));
        peer.push_event(json!({"event": {"audioOutput": {"content": BASE64.encode([1u8])}}}));

        let text = recv_event(&mut queues).await;
        assert_eq!(event::event_kind(&text), Some("textOutput"));
        let notice = recv_event(&mut queues).await;
        assert_eq!(notice["event"]["toolUiOutput"]["type"], "barge_in");
        assert!(session.is_barge_in());

        peer.push_event(json!({"event": {"contentStart": {"role": "ASSISTANT", "type": "AUDIO"}}}));
        peer.push_event(json!({"event": {"audioOutput": {"content": BASE64.encode([2u8])}}}));
        let chunk = tokio::time::timeout(WAIT, queues.audio.recv()).await.unwrap().unwrap();
        assert_eq!(&chunk.pcm[..], &[2]);
        assert_eq!(chunk.epoch, 1);
        assert_eq!(session.barge_in_epoch(), 1);
        assert!(!session.is_barge_in());
    }

    #[tokio::test]
    async fn malformed_frames_do_not_stop_the_loop() {
        let (session, mut queues, peer) = started().await;
        peer.push_raw(&b"not json"[..]);
        peer.push_event(json!({"event": {"audioOutput": {"content": "***"}}}));
        peer.push_event(json!({"event": {"textOutput": {"content": "still here"}}}));
        let ev = recv_event(&mut queues).await;
        assert_eq!(ev["event"]["textOutput"]["content"], "still here");
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn tool_round_trip_success_order() {
        let (_session, mut queues, peer) = started().await;
        peer.drain_sent().await;
        peer.push_event(json!({"event": {"toolUse": {
            "toolName": "lookupTool",
            "toolUseId": "use-1",
            "promptName": "p",
            "content": "{}"
        }}}));

        let mut client = Vec::new();
        for _ in 0..4 {
            client.push(recv_event(&mut queues).await);
        }
        assert_eq!(kinds(&client), vec!["toolUse", "toolUiOutput", "toolUiOutput", "toolUiOutput"]);
        assert_eq!(client[1]["event"]["toolUiOutput"]["content"]["status"], "started");
        assert_eq!(client[2]["event"]["toolUiOutput"]["content"]["status"], "completed");
        assert_eq!(client[3]["event"]["toolUiOutput"]["type"], "card");

        let mut model = Vec::new();
        for _ in 0..3 {
            model.push(peer.next_sent(WAIT).await.unwrap());
        }
        assert_eq!(kinds(&model), vec!["contentStart", "toolResult", "contentEnd"]);
        let start = &model[0]["event"]["contentStart"];
        assert_eq!(start["toolResultInputConfiguration"]["toolUseId"], "use-1");
        assert_eq!(start["shortDescription"], "Looking up");
        assert_eq!(model[1]["event"]["toolResult"]["content"], r#"{"found":true}"#);
        assert_eq!(model[2]["event"]["contentEnd"]["stopReason"], "TOOL_USE");

        // one content id and prompt for the whole reply
        let content_name = &start["contentName"];
        assert_eq!(&model[1]["event"]["toolResult"]["contentName"], content_name);
        assert_eq!(&model[2]["event"]["contentEnd"]["contentName"], content_name);
        assert_eq!(model[2]["event"]["contentEnd"]["promptName"], "p");
    }

    #[test]
    fn pending_tool_call_falls_back_to_session_prompt() {
        let call = PendingToolCall::from_tool_use(
            &json!({"toolName": "lookupTool", "toolUseId": "use-9"}),
            "session-prompt",
        );
        assert_eq!(call.tool_name, "lookupTool");
        assert_eq!(call.tool_use_id, "use-9");
        assert_eq!(call.prompt_name, "session-prompt");
        assert!(Uuid::parse_str(&call.content_name).is_ok());

        let end = call.content_end(StopReason::Error);
        assert_eq!(end["event"]["contentEnd"]["promptName"], "session-prompt");
        assert_eq!(end["event"]["contentEnd"]["contentName"], call.content_name.as_str());
    }

    #[tokio::test]
    async fn tool_round_trip_failure_uses_error_stop_reason() {
        let (_session, mut queues, peer) = started().await;
        peer.drain_sent().await;
        peer.push_event(json!({"event": {"toolUse": {
            "toolName": "missingTool",
            "toolUseId": "use-2",
            "promptName": "p",
            "content": "{}"
        }}}));
        let mut model = Vec::new();
        for _ in 0..3 {
            model.push(peer.next_sent(WAIT).await.unwrap());
        }
        assert_eq!(kinds(&model), vec!["contentStart", "toolResult", "contentEnd"]);
        let result: Value =
            serde_json::from_str(model[1]["event"]["toolResult"]["content"].as_str().unwrap()).unwrap();
        assert!(result["error"].as_str().unwrap().contains("missingTool"));
        assert_eq!(model[2]["event"]["contentEnd"]["stopReason"], "ERROR");

        let mut client = Vec::new();
        for _ in 0..3 {
            client.push(recv_event(&mut queues).await);
        }
        let done = &client[2]["event"]["toolUiOutput"]["content"];
        assert_eq!(done["status"], "completed");
        assert!(done["error"].as_str().unwrap().contains("missingTool"));

        peer.push_event(json!({"event": {"toolUse": {
            "toolName": "lookupTool",
            "toolUseId": "use-3",
            "promptName": "p",
            "content": "{\"fail\": true}"
        }}}));
        let mut model = Vec::new();
        for _ in 0..3 {
            model.push(peer.next_sent(WAIT).await.unwrap());
        }
        assert_eq!(model[2]["event"]["contentEnd"]["stopReason"], "ERROR");
    }

    #[tokio::test]
    async fn end_is_idempotent() {
        let (session, _queues, peer) = started().await;
        peer.drain_sent().await;
        session.end().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        let sent = peer.drain_sent().await;
        assert_eq!(kinds(&sent), vec!["promptEnd", "sessionEnd"]);

        session.end().await.unwrap();
        assert!(peer.drain_sent().await.is_empty());
        session.send_audio_chunk(&[0, 0]).await.unwrap();
    }

    #[tokio::test]
    async fn hang_up_fails_session_and_closes_queues() {
        let (session, mut queues, mut peer) = started().await;
        peer.hang_up();
        let closed = tokio::time::timeout(WAIT, queues.events.recv()).await.unwrap();
        assert!(closed.is_none());
        assert_eq!(session.state(), SessionState::Failed);
        session.end().await.unwrap();
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn replay_sends_non_interactive_turns() {
        let (session, _queues, peer) = started().await;
        peer.drain_sent().await;
        let mut history = sonicdesk_core::ConversationHistory::new(10);
        history.append("USER", "hi", None);
        history.append("ASSISTANT", "hello", None);
        let replayed = session.replay_history(&history.snapshot()).await.unwrap();
        assert_eq!(replayed, 2);
        let sent = peer.drain_sent().await;
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[0]["event"]["contentStart"]["role"], "USER");
        assert_eq!(sent[0]["event"]["contentStart"]["interactive"], false);
        assert_eq!(sent[3]["event"]["contentStart"]["role"], "ASSISTANT");
    }
}
