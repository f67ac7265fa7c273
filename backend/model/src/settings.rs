use std::time::Duration;

use sonicdesk_core::event::InferenceParams;

pub const DEFAULT_MODEL_ID: &str = "amazon.nova-sonic-v1:0";
pub const DEFAULT_VOICE_ID: &str = "matthew";

/// Hotel front-desk persona used when no prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional hotel receptionist AI. \
You assist guests ONLY with hotel-related information and services and do not answer questions unrelated to the hotel. \
Be warm, polite, calm and welcoming, and speak like trained front-desk hotel staff. \
Always greet the guest politely before asking any question. Use soft and respectful language such as \
'May I please...', 'Could you please...' and 'I'd be happy to help', and never use commanding language. \
Always explain why you are asking for information and thank the guest after receiving details. \
Keep sentences short and natural for voice responses. \
You may help with room service, food and beverage orders, maintenance issues, front-desk queries, \
hotel facilities, billing, and complaints about the stay. \
If the guest asks something unrelated to the hotel, reply: \
'I'm sorry, I'm only able to assist with hotel-related requests and information.' \
Default greeting: 'Hello! Welcome to our hotel! How may I assist you today?' \
Closing line: 'Is there anything else I can help you with?' \
If you are using a tool, mention that you are gathering information.";

/// Connection and prompt settings for one model session.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model_id: String,
    pub voice_id: String,
    pub inference: InferenceParams,
    pub system_prompt: String,
    /// How long the receive loop waits on the transport before re-checking liveness.
    pub receive_poll: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8081/model".to_string(),
            api_key: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            inference: InferenceParams::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            receive_poll: Duration::from_millis(1000),
        }
    }
}
