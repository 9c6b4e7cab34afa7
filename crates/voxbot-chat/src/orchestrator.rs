//! The assistant: owns sessions and runs classify, compose and write-back
//! for every turn.
//!
//! Each session sits behind its own lock. The session map is only locked
//! long enough to look a session up, so turns for different sessions run
//! in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voxbot_core::config::VoxbotConfig;
use voxbot_core::intents::IntentTable;
use voxbot_core::types::{ClassificationResult, ConversationContext, Intent};
use voxbot_nlu::{IntentClassifier, KeywordClassifier};

use crate::analytics::{AnalyticsSnapshot, SessionAnalytics};
use crate::composer::{Composition, ResponseComposer, ResponseKind};
use crate::error::ChatError;
use crate::session::{Session, SessionManager, SessionSummary};
use crate::voice::{SpeechToText, TextToSpeech, VoiceError};

/// Everything a caller needs after one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// The session that handled the turn. Differs from the requested id
    /// when an expired session was replaced.
    pub session_id: Uuid,
    /// `None` when the turn never reached the classifier (failed or empty
    /// transcription).
    pub classification: Option<ClassificationResult>,
    pub response: String,
    pub kind: ResponseKind,
    /// The intent is one of the configured end intents.
    pub ends_conversation: bool,
}

/// Runs conversations for any number of sessions.
pub struct Assistant {
    classifier: Arc<dyn IntentClassifier>,
    composer: ResponseComposer,
    manager: SessionManager,
    sessions: Mutex<HashMap<Uuid, SharedSession>>,
    analytics: Mutex<SessionAnalytics>,
    max_message_length: usize,
    stt_timeout_secs: u64,
    tts_timeout_secs: u64,
}

type SharedSession = Arc<Mutex<Session>>;

impl Assistant {
    /// Build an assistant around the keyword classifier.
    pub fn new(config: &VoxbotConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let classifier = KeywordClassifier::from_config(config)?;
        let table = Arc::clone(classifier.table());
        Ok(Self::assemble(config, Arc::new(classifier), table))
    }

    /// Build an assistant around another classification strategy.
    pub fn with_classifier(
        config: &VoxbotConfig,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Result<Self, ChatError> {
        config.validate()?;
        let table = Arc::new(IntentTable::from_config(config)?);
        Ok(Self::assemble(config, classifier, table))
    }

    fn assemble(
        config: &VoxbotConfig,
        classifier: Arc<dyn IntentClassifier>,
        table: Arc<IntentTable>,
    ) -> Self {
        info!(
            classifier = classifier.name(),
            intents = table.len(),
            "Assistant ready"
        );
        Self {
            classifier,
            composer: ResponseComposer::new(table, config.responses.clone()),
            manager: SessionManager::new(&config.session, config.responses.seed),
            sessions: Mutex::new(HashMap::new()),
            analytics: Mutex::new(SessionAnalytics::new()),
            max_message_length: config.session.max_message_length,
            stt_timeout_secs: config.session.stt_timeout_secs,
            tts_timeout_secs: config.session.tts_timeout_secs,
        }
    }

    pub fn classifier(&self) -> &dyn IntentClassifier {
        self.classifier.as_ref()
    }

    pub fn composer(&self) -> &ResponseComposer {
        &self.composer
    }

    pub fn start_session(&self) -> Result<Uuid, ChatError> {
        let session = self.manager.create_session();
        let id = session.id;
        self.lock_sessions()?
            .insert(id, Arc::new(Mutex::new(session)));
        info!(session_id = %id, "Session started");
        Ok(id)
    }

    /// Handle one typed (or already transcribed) utterance.
    pub fn handle_text(&self, session_id: Uuid, text: &str) -> Result<TurnOutcome, ChatError> {
        let length = text.chars().count();
        if length > self.max_message_length {
            self.record_error(&ChatError::MessageTooLong(self.max_message_length));
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }

        let started = Instant::now();
        let shared = self.live_session(session_id)?;
        let mut session = lock_session(&shared)?;

        let (context, rng) = session.context_and_rng();
        let result = self.classifier.classify(text, context);
        let composition = self.composer.compose_with(&result, context, rng);
        self.manager.record(&mut session, &result, &composition);

        let outcome = TurnOutcome {
            session_id: session.id,
            ends_conversation: self.manager.ends_conversation(&result.intent),
            response: composition.text.clone(),
            kind: composition.kind,
            classification: Some(result),
        };
        drop(session);

        self.log_turn(&outcome, &composition);
        self.record_turn(&composition.intent, &outcome, started.elapsed());
        Ok(outcome)
    }

    /// Handle the result of a speech-to-text call. Failures and empty
    /// transcripts skip classification and answer with the apology.
    pub fn handle_transcription(
        &self,
        session_id: Uuid,
        transcript: Result<String, VoiceError>,
    ) -> Result<TurnOutcome, ChatError> {
        let reason = match transcript {
            Ok(text) if !text.trim().is_empty() => return self.handle_text(session_id, &text),
            Ok(_) => "empty_transcript".to_string(),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Transcription failed");
                ChatError::Voice(e).kind().to_string()
            }
        };

        let started = Instant::now();
        let id = {
            let shared = self.live_session(session_id)?;
            let mut session = lock_session(&shared)?;
            session.last_active = chrono::Utc::now();
            session.id
        };

        let outcome = TurnOutcome {
            session_id: id,
            classification: None,
            response: self.composer.config().apology.clone(),
            kind: ResponseKind::Fallback,
            ends_conversation: false,
        };
        debug!(session_id = %id, reason = %reason, "Answered without classification");
        if let Ok(mut analytics) = self.analytics.lock() {
            analytics.record_error(&reason);
            analytics.record_turn(
                &Intent::unknown(),
                0.0,
                ResponseKind::Fallback,
                started.elapsed(),
            );
        }
        Ok(outcome)
    }

    /// Transcribe `audio` and handle the result, bounded by the configured
    /// speech-to-text timeout.
    pub async fn handle_audio(
        &self,
        session_id: Uuid,
        stt: &dyn SpeechToText,
        audio: &[u8],
    ) -> Result<TurnOutcome, ChatError> {
        let limit = Duration::from_secs(self.stt_timeout_secs);
        let transcript = match tokio::time::timeout(limit, stt.transcribe(audio)).await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Timeout(self.stt_timeout_secs)),
        };
        self.handle_transcription(session_id, transcript)
    }

    /// Render a response through a text-to-speech collaborator, bounded by
    /// the configured text-to-speech timeout.
    pub async fn speak(&self, tts: &dyn TextToSpeech, text: &str) -> Result<Vec<u8>, ChatError> {
        let limit = Duration::from_secs(self.tts_timeout_secs);
        let audio = match tokio::time::timeout(limit, tts.synthesize(text)).await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Timeout(self.tts_timeout_secs)),
        };
        audio.map_err(|e| {
            let err = ChatError::Voice(e);
            self.record_error(&err);
            err
        })
    }

    /// Snapshot of a session's conversation context.
    pub fn context(&self, session_id: Uuid) -> Result<ConversationContext, ChatError> {
        let shared = self.find_session(session_id)?;
        let session = lock_session(&shared)?;
        Ok(session.context.clone())
    }

    pub fn end_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let removed = self.lock_sessions()?.remove(&session_id);
        match removed {
            Some(shared) => {
                let turns = lock_session(&shared)?.context.turn_count;
                info!(session_id = %session_id, turns, "Session ended");
                Ok(())
            }
            None => Err(ChatError::SessionNotFound(session_id)),
        }
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let shared: Vec<SharedSession> = match self.sessions.lock() {
            Ok(s) => s.values().cloned().collect(),
            Err(_) => return vec![],
        };
        let mut list: Vec<SessionSummary> = shared
            .iter()
            .filter_map(|s| s.lock().ok().map(|session| session.summary()))
            .collect();
        list.sort_by_key(|s| s.started_at);
        list
    }

    pub fn stats(&self) -> AnalyticsSnapshot {
        match self.analytics.lock() {
            Ok(a) => a.snapshot(),
            Err(poisoned) => poisoned.into_inner().snapshot(),
        }
    }

    // -- Private helpers --

    fn lock_sessions(&self) -> Result<MutexGuard<'_, HashMap<Uuid, SharedSession>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Lock(format!("session map lock poisoned: {}", e)))
    }

    fn find_session(&self, session_id: Uuid) -> Result<SharedSession, ChatError> {
        self.lock_sessions()?
            .get(&session_id)
            .cloned()
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    /// The requested session, replaced by a fresh one if it has expired.
    ///
    /// The session lock is released before the map is locked again, so the
    /// map lock is never requested while a session lock is held.
    fn live_session(&self, session_id: Uuid) -> Result<SharedSession, ChatError> {
        let shared = self.find_session(session_id)?;
        let expired = self.manager.is_expired(&*lock_session(&shared)?);
        if !expired {
            return Ok(shared);
        }

        let mut sessions = self.lock_sessions()?;
        if sessions.remove(&session_id).is_none() {
            return Err(ChatError::SessionNotFound(session_id));
        }
        let fresh = self.manager.create_session();
        let id = fresh.id;
        let shared = Arc::new(Mutex::new(fresh));
        sessions.insert(id, Arc::clone(&shared));
        info!(expired = %session_id, session_id = %id, "Session expired, started a new one");
        Ok(shared)
    }

    fn log_turn(&self, outcome: &TurnOutcome, composition: &Composition) {
        let confidence = outcome
            .classification
            .as_ref()
            .map(|c| c.confidence)
            .unwrap_or(0.0);
        match composition.kind {
            ResponseKind::Template => debug!(
                session_id = %outcome.session_id,
                intent = %composition.intent,
                confidence,
                template = ?composition.template,
                "Turn handled"
            ),
            ResponseKind::Clarification => warn!(
                session_id = %outcome.session_id,
                intent = %composition.intent,
                confidence,
                "Low confidence, asked the user to rephrase"
            ),
            ResponseKind::Fallback => warn!(
                session_id = %outcome.session_id,
                intent = %composition.intent,
                "Responded with apology"
            ),
        }
        if outcome.ends_conversation {
            info!(session_id = %outcome.session_id, "Conversation closed by user");
        }
    }

    fn record_turn(&self, intent: &Intent, outcome: &TurnOutcome, elapsed: Duration) {
        let confidence = outcome
            .classification
            .as_ref()
            .map(|c| c.confidence)
            .unwrap_or(0.0);
        if let Ok(mut analytics) = self.analytics.lock() {
            analytics.record_turn(intent, confidence, outcome.kind, elapsed);
        }
    }

    fn record_error(&self, err: &ChatError) {
        if let Ok(mut analytics) = self.analytics.lock() {
            analytics.record_error(err.kind());
        }
    }
}

fn lock_session(session: &Mutex<Session>) -> Result<MutexGuard<'_, Session>, ChatError> {
    session
        .lock()
        .map_err(|e| ChatError::Lock(format!("session lock poisoned: {}", e)))
}

// =============================================================================
// Tests
// =============================================================================
