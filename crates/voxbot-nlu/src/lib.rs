//! Intent recognition for voxbot.
//!
//! Scores an utterance against the configured keyword table, picks the
//! winning intent and pulls typed entities out of the raw text. Nothing in
//! here fails at runtime: no match means `unknown`, no entities means an
//! empty map.

pub mod classifier;
pub mod entity;

pub use classifier::{IntentClassifier, IntentScore, KeywordClassifier};
pub use entity::EntityExtractor;
