use thiserror::Error;

use sonicdesk_core::CoreError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model session is not active")]
    NotActive,

    #[error("failed to encode model event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<ModelError> for CoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Transport(msg) => CoreError::Transport(msg),
            other => CoreError::Other(anyhow::Error::new(other)),
        }
    }
}
