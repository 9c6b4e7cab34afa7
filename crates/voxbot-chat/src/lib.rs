//! Conversation layer for Voxbot.
//!
//! Composes responses from classified utterances, keeps per-session
//! context, and wires the speech collaborators into the turn loop.

pub mod analytics;
pub mod composer;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod template;
pub mod voice;

pub use analytics::{AnalyticsSnapshot, IntentSummary, SessionAnalytics};
pub use composer::{Composition, ResponseComposer, ResponseKind};
pub use error::ChatError;
pub use orchestrator::{Assistant, TurnOutcome};
pub use session::{Session, SessionManager, SessionSummary};
pub use template::{Template, TemplateError};
pub use voice::{SpeechToText, TextToSpeech, VoiceError};
