//! Core data model and configuration for the voxbot assistant pipeline.
//!
//! Everything here is plain data: the intent/template tables loaded once at
//! startup, the per-utterance classification record, and the per-session
//! conversation context that callers write back after each turn.

pub mod config;
pub mod error;
pub mod intents;
pub mod text;
pub mod types;

pub use config::VoxbotConfig;
pub use error::{Result, VoxbotError};
pub use intents::{IntentDef, IntentTable};
pub use types::*;
