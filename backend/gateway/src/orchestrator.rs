//! Per-connection session orchestration.
//!
//! A [`SessionOrchestrator`] owns one client connection's conversation: it
//! starts a [`ModelSession`], forwards microphone audio and client commands
//! to it, and runs two egress tasks that relay model audio and model events
//! back to the client while recording the transcript.
//!
//! Field ownership:
//! - the speaker role is owned by the event egress task;
//! - the audio-turn flag and the throttle are owned by the connection task;
//! - the history is appended from both, one short critical section at a
//!   time, never across an await.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sonicdesk_config::{AudioConfig, SessionConfig};
use sonicdesk_core::event;
use sonicdesk_core::{
    leading_user_trim, ConversationHistory, CoreError, HistoryEntry, Role, RoleClassifier,
    SourceInfo, ToolRegistry,
};
use sonicdesk_logging::{ConversationEvent, EventLogger};
use sonicdesk_model::{AudioChunk, ModelConnector, ModelSession, ModelSettings};
use sonicdesk_storage::{SessionMetadata, SharedSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::debug_audio::DebugAudioRecorder;
use crate::rate_limit::AudioThrottle;
use crate::session_registry::SessionRegistry;
use crate::ws_protocol::{parse_text_frame, ClientFrame, ClientMessage};

/// Text sent to the model when the user clicks a button in a tool card.
pub const BUTTON_CLICK_PROMPT: &str =
    "The user clicked a button. Please acknowledge this action and respond both in text and speech.";

const HISTORY_SOURCE: &str = "websocket";

/// Tunables for one orchestrated connection.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_history: usize,
    pub audio_min_interval: Duration,
    pub output_chunk_bytes: usize,
    pub audio_poll: Duration,
    pub event_poll: Duration,
    pub replay_history: bool,
    /// Directory for debug WAV files; `None` disables capture.
    pub debug_audio_dir: Option<PathBuf>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default(), &AudioConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(session: &SessionConfig, audio: &AudioConfig) -> Self {
        Self {
            max_history: session.max_history,
            audio_min_interval: Duration::from_millis(session.audio_min_interval_ms),
            output_chunk_bytes: session.output_chunk_bytes.max(1),
            audio_poll: Duration::from_millis(session.audio_poll_ms),
            event_poll: Duration::from_millis(session.event_poll_ms),
            replay_history: session.replay_history,
            debug_audio_dir: audio
                .save_debug_audio
                .then(|| PathBuf::from(&audio.debug_dir)),
        }
    }
}

/// Process-wide collaborators handed to every connection.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub tools: Arc<ToolRegistry>,
    pub connector: Arc<dyn ModelConnector>,
    pub sink: SharedSink,
    pub sessions: SessionRegistry,
    pub model_settings: ModelSettings,
    pub settings: OrchestratorSettings,
}

/// State touched by both the connection task and the egress tasks.
struct Shared {
    session_id: String,
    classifier: RoleClassifier,
    history: Mutex<ConversationHistory>,
    debug_audio: Mutex<Option<DebugAudioRecorder>>,
}

impl Shared {
    fn new(session_id: String, max_history: usize, debug_audio: Option<DebugAudioRecorder>) -> Self {
        Self {
            session_id,
            classifier: RoleClassifier::new(),
            history: Mutex::new(ConversationHistory::new(max_history)),
            debug_audio: Mutex::new(debug_audio),
        }
    }

    /// Append `text` under the role the classifier assigns to `event_type`.
    fn record(&self, text: &str, event_type: &str, event: Option<&Value>) -> HistoryEntry {
        let role = self
            .classifier
            .classify(Some(HISTORY_SOURCE), Some(event_type), event);
        self.record_as(role, text, event_type)
    }

    fn record_as(&self, role: Role, text: &str, event_type: &str) -> HistoryEntry {
        let entry = lock(&self.history)
            .append(
                role.as_str(),
                text,
                Some(SourceInfo::new(HISTORY_SOURCE, Some(event_type), !text.is_empty())),
            )
            .clone();
        EventLogger::log_event(
            &self.session_id,
            ConversationEvent::HistoryAppend {
                role: entry.role.to_string(),
                content: entry.text.clone(),
                content_name: entry.content_id.clone(),
                event_type: Some(event_type.to_string()),
            },
        );
        entry
    }

    fn with_debug_audio(&self, f: impl FnOnce(&mut DebugAudioRecorder)) {
        if let Some(recorder) = lock(&self.debug_audio).as_mut() {
            f(recorder);
        }
    }
}

pub struct SessionOrchestrator {
    shared: Arc<Shared>,
    model: Arc<ModelSession>,
    client_tx: mpsc::UnboundedSender<ClientMessage>,
    deps: OrchestratorDeps,
    throttle: AudioThrottle,
    audio_content_started: bool,
    started_at: DateTime<Utc>,
    egress_tasks: Vec<JoinHandle<()>>,
}

impl SessionOrchestrator {
    /// Start the model session, replay the carried-over transcript, send the
    /// tool catalog to the client and spawn both egress tasks.
    pub async fn connect(
        deps: OrchestratorDeps,
        client_tx: mpsc::UnboundedSender<ClientMessage>,
    ) -> anyhow::Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        let settings = deps.settings.clone();

        let model = Arc::new(ModelSession::new(deps.model_settings.clone(), deps.tools.clone()));
        let queues = model
            .start(deps.connector.as_ref())
            .await
            .context("Failed to start model session")?;

        if settings.replay_history {
            let replay = leading_user_trim(deps.sessions.carry_over().await);
            if let Err(e) = model.replay_history(&replay).await {
                warn!(session_id, error = %e, "Failed to replay conversation history");
            }
        }

        let _ = client_tx.send(ClientMessage::json(&event::init(deps.tools.model_tool_configs())));

        let shared = Arc::new(Shared::new(
            session_id.clone(),
            settings.max_history,
            settings.debug_audio_dir.clone().map(DebugAudioRecorder::new),
        ));

        let audio_task = {
            let model = model.clone();
            let egress = AudioEgress {
                client_tx: client_tx.clone(),
                shared: shared.clone(),
                chunk_bytes: settings.output_chunk_bytes,
                poll: settings.audio_poll,
            };
            tokio::spawn(egress.run(queues.audio, move |epoch| {
                model.is_barge_in() || model.barge_in_epoch() > epoch
            }))
        };
        let event_task = tokio::spawn(event_egress_loop(
            shared.clone(),
            queues.events,
            client_tx.clone(),
            settings.event_poll,
        ));

        deps.sessions.register(session_id.clone()).await;
        info!(session_id, prompt = model.prompt_name(), "Client session connected");

        Ok(Self {
            shared,
            model,
            client_tx,
            throttle: AudioThrottle::new(settings.audio_min_interval),
            deps,
            audio_content_started: false,
            started_at: Utc::now(),
            egress_tasks: vec![audio_task, event_task],
        })
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn model(&self) -> &ModelSession {
        &self.model
    }

    pub fn audio_content_started(&self) -> bool {
        self.audio_content_started
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.shared.history).snapshot()
    }

    /// Dispatch one inbound text frame. Malformed frames are logged and ignored.
    pub async fn handle_text(&mut self, text: &str) {
        let frame = match parse_text_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = self.session_id(), error = %e, "Ignoring client message");
                return;
            }
        };
        match frame {
            ClientFrame::StartAudio => self.start_audio().await,
            ClientFrame::StopAudio => self.stop_audio().await,
            ClientFrame::UiInteraction(interaction) => self.handle_ui_interaction(&interaction).await,
            ClientFrame::ToolUse(envelope) => self.handle_tool_use(&envelope).await,
            ClientFrame::TextInput(content) => self.handle_text_input(&content).await,
            ClientFrame::Unknown(kind) => {
                debug!(session_id = self.session_id(), kind, "Unhandled client event");
            }
        }
    }

    /// Forward a microphone chunk, subject to the audio throttle.
    pub async fn receive_audio(&mut self, pcm: &[u8]) -> bool {
        self.receive_audio_at(pcm, Instant::now()).await
    }

    /// [`receive_audio`](Self::receive_audio) with an explicit arrival time.
    ///
    /// Returns whether the chunk was forwarded. Chunks outside an audio turn
    /// are ignored.
    pub async fn receive_audio_at(&mut self, pcm: &[u8], now: Instant) -> bool {
        if !self.audio_content_started || !self.throttle.admit(now) {
            return false;
        }
        self.shared.with_debug_audio(|rec| rec.write_input(pcm));
        match self.model.send_audio_chunk(pcm).await {
            Ok(()) => {
                debug!(bytes = pcm.len(), "Forwarded audio chunk");
                true
            }
            Err(e) => {
                error!(session_id = self.session_id(), error = %e, "Error sending audio chunk");
                false
            }
        }
    }

    /// Open an audio turn. No-op if one is already open.
    pub async fn start_audio(&mut self) {
        if self.audio_content_started {
            return;
        }
        info!(session_id = self.session_id(), "Starting audio input");
        self.shared.with_debug_audio(|rec| {
            if let Err(e) = rec.open() {
                warn!(error = %e, "Could not open debug audio files");
            }
        });
        match self.model.start_audio_input().await {
            Ok(content_name) => {
                debug!(content_name, "Audio turn opened");
                self.audio_content_started = true;
            }
            Err(e) => error!(session_id = self.session_id(), error = %e, "Error starting audio input"),
        }
    }

    /// Close the open audio turn. No-op if none is open.
    pub async fn stop_audio(&mut self) {
        if !self.audio_content_started {
            return;
        }
        info!(session_id = self.session_id(), "Stopping audio input");
        if let Err(e) = self.model.end_audio_input().await {
            error!(session_id = self.session_id(), error = %e, "Error stopping audio input");
            return;
        }
        self.audio_content_started = false;
        self.shared.with_debug_audio(DebugAudioRecorder::close);
    }

    async fn handle_text_input(&mut self, content: &str) {
        if content.trim().is_empty() {
            return;
        }
        self.shared.record(content, "textInput", None);
        if let Err(e) = self.model.send_text_turn(Role::User.as_str(), content, true).await {
            error!(session_id = self.session_id(), error = %e, "Failed to forward text input");
        }
    }

    /// Turn a UI action into a spoken/text user turn for the model.
    pub async fn handle_ui_interaction(&mut self, interaction: &Value) {
        if interaction["type"].as_str() != Some("button_click") {
            debug!(?interaction, "Ignoring UI interaction");
            return;
        }
        self.shared.record(BUTTON_CLICK_PROMPT, "ui_interaction", Some(interaction));
        if let Err(e) = self
            .model
            .send_text_turn(Role::User.as_str(), BUTTON_CLICK_PROMPT, true)
            .await
        {
            error!(session_id = self.session_id(), error = %e, "Failed to send UI interaction to model");
        }
    }

    /// Execute a client-originated `toolUse` and report back to the client.
    ///
    /// Order: USER history entry, execution, ASSISTANT history entry,
    /// `toolResult`, then `toolUiOutput` when the tool produced one.
    pub async fn handle_tool_use(&mut self, envelope: &Value) {
        let tool_use = event::event_body(envelope, "toolUse").cloned().unwrap_or(Value::Null);
        let tool_name = tool_use["toolName"].as_str().unwrap_or_default().to_string();
        let tool_use_id = tool_use["toolUseId"].as_str().unwrap_or_default();
        let prompt_name = tool_use["promptName"]
            .as_str()
            .unwrap_or(self.model.prompt_name())
            .to_string();
        let content_name = Uuid::new_v4().to_string();
        info!(session_id = self.session_id(), tool = %tool_name, tool_use_id, "Handling client tool use");

        self.shared.record(
            &format!("User requested tool: {tool_name}"),
            "toolUse",
            Some(envelope),
        );
        EventLogger::log_event(
            self.session_id(),
            ConversationEvent::ToolCall {
                tool_name: tool_name.clone(),
                arguments_json: tool_use["content"].to_string(),
            },
        );

        let outcome = match parse_tool_content(&tool_use["content"]) {
            Ok(content) => self.deps.tools.execute(&tool_name, content).await,
            Err(e) => Err(e),
        };

        let (result_event, ui) = match outcome {
            Ok(output) if !output.is_error() => {
                self.shared.record(
                    &format!("Tool {tool_name} executed successfully"),
                    "toolResult",
                    None,
                );
                let result = event::tool_result(&prompt_name, &content_name, &output.model_result);
                (result, output.ui_result)
            }
            failed => {
                let message = match failed {
                    Ok(output) => output.error_message().unwrap_or_else(|| "Unknown error".into()),
                    Err(e) => e.to_string(),
                };
                self.shared.record(
                    &format!("Tool {tool_name} failed: {message}"),
                    "toolResult",
                    None,
                );
                EventLogger::log_event(
                    self.session_id(),
                    ConversationEvent::Error {
                        error_msg: format!("tool {tool_name}: {message}"),
                    },
                );
                (error_tool_result(&prompt_name, &content_name, &message), None)
            }
        };
        EventLogger::log_event(
            self.session_id(),
            ConversationEvent::ToolResult {
                tool_name: tool_name.clone(),
                success: result_event["event"]["toolResult"].get("error").is_none(),
            },
        );

        let _ = self.client_tx.send(ClientMessage::json(&result_event));
        if let Some(ui) = ui {
            let _ = self.client_tx.send(ClientMessage::json(&event::tool_ui_output(ui)));
        }
    }

    /// Tear the connection down and hand the transcript to storage.
    ///
    /// Safe to call after the egress tasks or the model session have
    /// already stopped.
    pub async fn disconnect(mut self) {
        let session_id = self.shared.session_id.clone();
        info!(
            session_id,
            throttled_audio_chunks = self.throttle.dropped(),
            "Disconnecting client session"
        );

        self.stop_audio().await;
        for task in self.egress_tasks.drain(..) {
            task.abort();
        }
        if let Err(e) = self.model.end().await {
            warn!(session_id, error = %e, "Model session did not end cleanly");
        }
        self.shared.with_debug_audio(|rec| {
            rec.close();
            if !rec.files().is_empty() {
                info!(
                    session_id,
                    files = ?rec.files(),
                    received = rec.received_chunks(),
                    sent = rec.sent_chunks(),
                    "Debug audio capture finished"
                );
            }
        });

        let history = self.history();
        if !history.is_empty() {
            let metadata = SessionMetadata::new(self.started_at, Utc::now());
            match self.deps.sink.store(&session_id, &history, &metadata).await {
                Ok(()) => info!(session_id, sink = self.deps.sink.name(), messages = history.len(), "Conversation stored"),
                Err(e) => error!(session_id, error = %e, "Failed to store conversation"),
            }
        }
        self.deps.sessions.set_carry_over(history).await;
        self.deps.sessions.unregister(&session_id).await;
    }
}

/// Tool input arrives as a JSON string; an empty or missing body is `{}`.
fn parse_tool_content(content: &Value) -> Result<Value, CoreError> {
    match content {
        Value::Null => Ok(json!({})),
        Value::String(s) if s.trim().is_empty() => Ok(json!({})),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| CoreError::MalformedMessage(format!("invalid tool content: {e}"))),
        other => Ok(other.clone()),
    }
}

fn error_tool_result(prompt_name: &str, content_name: &str, message: &str) -> Value {
    let mut result = event::tool_result(prompt_name, content_name, &json!({ "error": message }));
    result["event"]["toolResult"]["error"] = Value::String(message.to_string());
    result
}

// ---------------------------------------------------------------------------
// Egress
// ---------------------------------------------------------------------------

struct AudioEgress {
    client_tx: mpsc::UnboundedSender<ClientMessage>,
    shared: Arc<Shared>,
    chunk_bytes: usize,
    poll: Duration,
}

impl AudioEgress {
    /// Relay model audio to the client in `chunk_bytes` pieces.
    ///
    /// `interrupted(epoch)` reports whether audio tagged with `epoch` has been
    /// cut off by a barge-in. Such chunks are discarded even if the barge-in
    /// has since been cleared, and delivery of a chunk stops at the first
    /// piece boundary after it becomes interrupted.
    async fn run(
        self,
        mut audio: mpsc::UnboundedReceiver<AudioChunk>,
        interrupted: impl Fn(u64) -> bool + Send + Sync + 'static,
    ) {
        loop {
            let chunk = match tokio::time::timeout(self.poll, audio.recv()).await {
                Err(_) => {
                    if self.client_tx.is_closed() {
                        break;
                    }
                    continue;
                }
                Ok(None) => break,
                Ok(Some(chunk)) => chunk,
            };
            let epoch = chunk.epoch;
            if interrupted(epoch) {
                debug!(bytes = chunk.pcm.len(), epoch, "Interrupted audio; discarding");
                continue;
            }
            self.shared.with_debug_audio(|rec| rec.write_output(&chunk.pcm));
            let is_barge_in = || interrupted(epoch);
            if deliver_audio(&chunk.pcm, self.chunk_bytes, &is_barge_in, &self.client_tx)
                .await
                .is_err()
            {
                break;
            }
        }
        debug!(session_id = self.shared.session_id, "Audio egress stopped");
    }
}

/// Send `payload` as binary pieces, checking barge-in before each one.
///
/// Returns the number of pieces sent, or `Err` if the client is gone.
async fn deliver_audio(
    payload: &Bytes,
    chunk_bytes: usize,
    is_barge_in: &impl Fn() -> bool,
    client_tx: &mpsc::UnboundedSender<ClientMessage>,
) -> Result<usize, ()> {
    let mut sent = 0;
    let mut offset = 0;
    while offset < payload.len() {
        if is_barge_in() {
            debug!(sent, "Barge-in mid-payload; stopping audio delivery");
            break;
        }
        let end = (offset + chunk_bytes).min(payload.len());
        client_tx
            .send(ClientMessage::Binary(payload.slice(offset..end)))
            .map_err(|_| ())?;
        sent += 1;
        offset = end;
        tokio::task::yield_now().await;
    }
    Ok(sent)
}

/// Speaker tracking and history recording for model events.
#[derive(Debug, Default)]
struct EventRecorder {
    speaker: Option<String>,
}

impl EventRecorder {
    fn observe(&mut self, shared: &Shared, ev: &Value) {
        let Some(kind) = event::event_kind(ev) else { return };
        let body = &ev["event"][kind];
        for record in model_tool_events(kind, body) {
            EventLogger::log_event(&shared.session_id, record);
        }
        match kind {
            "textOutput" => {
                let text = body["content"].as_str().unwrap_or_default();
                if text.trim().is_empty() || event::is_barge_in_text(text) {
                    return;
                }
                // transcribed user speech arrives as textOutput
                match self.speaker.as_deref().and_then(Role::parse) {
                    Some(Role::User) => shared.record_as(Role::User, text, kind),
                    _ => shared.record(text, kind, Some(ev)),
                };
            }
            "textInput" => {
                let text = body["content"].as_str().unwrap_or_default();
                if !text.trim().is_empty() {
                    shared.record(text, kind, Some(ev));
                }
            }
            "contentStart" => {
                self.speaker = body["role"].as_str().map(str::to_string);
                debug!(role = ?self.speaker, content_name = ?body["contentName"].as_str(), "Content started");
            }
            "contentEnd" => {
                self.speaker = None;
            }
            _ => {}
        }
    }
}

/// Structured log records for the model's own tool round trips.
///
/// The model session answers these itself, so the gateway only observes the
/// `toolUse` request and the `completed` progress notice that closes it.
fn model_tool_events(kind: &str, body: &Value) -> Vec<ConversationEvent> {
    match kind {
        "toolUse" => vec![ConversationEvent::ToolCall {
            tool_name: body["toolName"].as_str().unwrap_or_default().to_string(),
            arguments_json: body["content"].to_string(),
        }],
        "toolUiOutput"
            if body["type"] == "tool_exec_progress" && body["content"]["status"] == "completed" =>
        {
            let content = &body["content"];
            let tool_name = content["toolName"].as_str().unwrap_or_default().to_string();
            match content["error"].as_str() {
                None => vec![ConversationEvent::ToolResult { tool_name, success: true }],
                Some(message) => vec![
                    ConversationEvent::Error {
                        error_msg: format!("tool {tool_name}: {message}"),
                    },
                    ConversationEvent::ToolResult { tool_name, success: false },
                ],
            }
        }
        _ => Vec::new(),
    }
}

/// Record each model event into the history, then forward it verbatim.
///
/// When the model's event queue closes the client is asked to close too.
async fn event_egress_loop(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<Value>,
    client_tx: mpsc::UnboundedSender<ClientMessage>,
    poll: Duration,
) {
    let mut recorder = EventRecorder::default();
    loop {
        let ev = match tokio::time::timeout(poll, events.recv()).await {
            Err(_) => {
                if client_tx.is_closed() {
                    break;
                }
                continue;
            }
            Ok(None) => {
                warn!(session_id = shared.session_id, "Model event stream ended");
                let _ = client_tx.send(ClientMessage::Close);
                break;
            }
            Ok(Some(ev)) => ev,
        };
        recorder.observe(&shared, &ev);
        if client_tx.send(ClientMessage::json(&ev)).is_err() {
            break;
        }
    }
    debug!(session_id = shared.session_id, "Event egress stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
