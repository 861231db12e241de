//! Error types for the chat session layer.

use parley_core::error::ParleyError;

/// Errors from the chat engine and its remote backend.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("a question is already waiting for an answer")]
    SendInFlight,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend returned HTTP {status}")]
    Http { status: u16 },
    #[error("could not decode backend response: {0}")]
    Decode(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Transport(_) => true,
            ChatError::Http { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ChatError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => ChatError::Http {
                status: status.as_u16(),
            },
            None => ChatError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}
