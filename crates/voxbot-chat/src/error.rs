//! Error types for session handling.
//!
//! Classification and composition never fail; these errors only come from
//! session management, input validation and the speech collaborators.

use voxbot_core::error::VoxbotError;

use crate::voice::VoiceError;

/// Errors from the assistant's session layer.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("voice error: {0}")]
    Voice(#[from] VoiceError),
    #[error("lock poisoned: {0}")]
    Lock(String),
    #[error("configuration error: {0}")]
    Core(#[from] VoxbotError),
}

impl ChatError {
    /// Short label used as the analytics error type.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::SessionNotFound(_) => "session_not_found",
            ChatError::MessageTooLong(_) => "message_too_long",
            ChatError::Voice(_) => "voice",
            ChatError::Lock(_) => "lock",
            ChatError::Core(_) => "config",
        }
    }
}
