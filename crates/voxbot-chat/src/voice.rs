//! Speech collaborator contracts.
//!
//! Audio capture and synthesis live outside this crate. The assistant only
//! needs something that turns audio into text and text back into audio.

use async_trait::async_trait;

/// Failures reported by a speech collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoiceError {
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech service timed out after {0}s")]
    Timeout(u64),
    #[error("speech service unavailable")]
    Unavailable,
}

/// Turns captured audio into an utterance.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// Renders a composed response as audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError>;
}
