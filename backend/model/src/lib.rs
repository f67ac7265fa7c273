pub mod error;
pub mod session;
pub mod settings;
pub mod transport;
pub mod ws_transport;

pub use error::ModelError;
pub use session::{AudioChunk, ModelQueues, ModelSession, SessionState};
pub use settings::{ModelSettings, DEFAULT_MODEL_ID, DEFAULT_SYSTEM_PROMPT, DEFAULT_VOICE_ID};
pub use transport::{MemoryConnector, MemoryPeer, MemoryTransport, ModelConnector, ModelTransport};
pub use ws_transport::{WsConnector, WsTransport};
