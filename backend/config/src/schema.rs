//! SonicDesk runtime configuration schema.
//!
//! Every section is optional in the YAML file; missing keys take the values
//! from [`crate::defaults`].

use serde::{Deserialize, Serialize};

use crate::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SonicDeskConfig {
    /// HTTP / WebSocket listener
    pub server: ServerConfig,

    /// Speech-to-speech model connection and prompt
    pub model: ModelConfig,

    /// Per-connection orchestration knobs
    pub session: SessionConfig,

    /// Debug audio capture
    pub audio: AudioConfig,

    /// Conversation persistence
    pub storage: StorageConfig,

    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Allow any origin, method and header.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            cors_permissive: true,
        }
    }
}

impl ServerConfig {
    /// `bind:port`, suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    /// WebSocket URL of the speech-to-speech relay.
    pub endpoint: String,

    /// Sent as a Bearer token when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model_id: String,
    pub voice_id: String,
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,

    /// Falls back to the built-in receptionist prompt when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub receive_poll_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            api_key: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
            receive_poll_ms: DEFAULT_RECEIVE_POLL_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub max_history: usize,
    /// Minimum spacing between audio chunks forwarded to the model.
    pub audio_min_interval_ms: u64,
    /// Size of binary frames sent to the client.
    pub output_chunk_bytes: usize,
    pub audio_poll_ms: u64,
    pub event_poll_ms: u64,
    /// Replay the previous session's transcript into a new model session.
    pub replay_history: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            audio_min_interval_ms: DEFAULT_AUDIO_MIN_INTERVAL_MS,
            output_chunk_bytes: DEFAULT_OUTPUT_CHUNK_BYTES,
            audio_poll_ms: DEFAULT_AUDIO_POLL_MS,
            event_poll_ms: DEFAULT_EVENT_POLL_MS,
            replay_history: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Audio / storage / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioConfig {
    pub save_debug_audio: bool,
    pub debug_dir: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            save_debug_audio: false,
            debug_dir: DEFAULT_DEBUG_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub enabled: bool,
    /// `file`, `sqlite` or `none`.
    pub backend: String,
    pub path: String,
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: DEFAULT_STORAGE_BACKEND.to_string(),
            path: DEFAULT_STORAGE_PATH.to_string(),
            prefix: DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            dir: DEFAULT_LOG_DIR.to_string(),
        }
    }
}
