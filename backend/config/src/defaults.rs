//! Default values, plus normalisation of blank settings after load.

use crate::schema::SonicDeskConfig;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_MODEL_ENDPOINT: &str = "ws://127.0.0.1:8081/model";
pub const DEFAULT_MODEL_ID: &str = "amazon.nova-sonic-v1:0";
pub const DEFAULT_VOICE_ID: &str = "matthew";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_RECEIVE_POLL_MS: u64 = 1000;

pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_AUDIO_MIN_INTERVAL_MS: u64 = 100;
pub const DEFAULT_OUTPUT_CHUNK_BYTES: usize = 4096;
pub const DEFAULT_AUDIO_POLL_MS: u64 = 100;
pub const DEFAULT_EVENT_POLL_MS: u64 = 1000;

pub const DEFAULT_DEBUG_DIR: &str = "debug_audio";

pub const DEFAULT_STORAGE_BACKEND: &str = "file";
pub const DEFAULT_STORAGE_PATH: &str = "conversations";
pub const DEFAULT_STORAGE_PREFIX: &str = "conversations";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Replace blank strings, left behind by `key: ""` or an empty `${VAR}`
/// expansion, with their defaults.
pub fn apply_all_defaults(config: SonicDeskConfig) -> SonicDeskConfig {
    let config = apply_model_defaults(config);
    let config = apply_storage_defaults(config);
    apply_logging_defaults(config)
}

fn fill(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

fn apply_model_defaults(mut config: SonicDeskConfig) -> SonicDeskConfig {
    let model = &mut config.model;
    fill(&mut model.model_id, DEFAULT_MODEL_ID);
    fill(&mut model.voice_id, DEFAULT_VOICE_ID);
    if model.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        model.api_key = None;
    }
    if model.system_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
        model.system_prompt = None;
    }
    if model.receive_poll_ms == 0 {
        model.receive_poll_ms = DEFAULT_RECEIVE_POLL_MS;
    }
    config
}

fn apply_storage_defaults(mut config: SonicDeskConfig) -> SonicDeskConfig {
    fill(&mut config.storage.backend, DEFAULT_STORAGE_BACKEND);
    config.storage.backend = config.storage.backend.to_lowercase();
    fill(&mut config.audio.debug_dir, DEFAULT_DEBUG_DIR);
    config
}

fn apply_logging_defaults(mut config: SonicDeskConfig) -> SonicDeskConfig {
    fill(&mut config.logging.level, DEFAULT_LOG_LEVEL);
    fill(&mut config.logging.dir, DEFAULT_LOG_DIR);
    config
}
