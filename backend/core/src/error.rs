use thiserror::Error;

/// Top-level error type for the SonicDesk runtime.
///
/// Only `Transport` is terminal for a session; every other variant is
/// contained at the loop or handler boundary that produced it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error ends the session it occurred in.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }
}
