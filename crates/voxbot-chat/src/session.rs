//! Per-session state and its lifecycle.
//!
//! Each session owns its [`ConversationContext`] and random source. The
//! classifier and composer only read the context; [`SessionManager::record`]
//! is the single place it is written back.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use uuid::Uuid;

use voxbot_core::config::SessionConfig;
use voxbot_core::types::{ClassificationResult, ConversationContext, Intent};

use crate::composer::Composition;

/// One conversation.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub context: ConversationContext,
    /// Set once an end intent has been handled.
    pub ended: bool,
    rng: StdRng,
}

impl Session {
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Read access to the context alongside the session's random source.
    pub fn context_and_rng(&mut self) -> (&ConversationContext, &mut StdRng) {
        (&self.context, &mut self.rng)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            started_at: self.started_at,
            last_active: self.last_active,
            turn_count: self.context.turn_count,
            last_intent: self.context.last_intent.clone(),
            ended: self.ended,
        }
    }
}

/// Lightweight view of a session for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turn_count: u32,
    pub last_intent: Option<Intent>,
    pub ended: bool,
}

/// Creates, expires and updates sessions.
pub struct SessionManager {
    session_timeout_minutes: u32,
    history_limit: usize,
    end_intents: Vec<Intent>,
    seed: Option<u64>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, seed: Option<u64>) -> Self {
        Self {
            session_timeout_minutes: config.session_timeout_minutes,
            history_limit: config.history_limit,
            end_intents: config.end_intents.iter().map(Intent::new).collect(),
            seed,
        }
    }

    /// A fresh session. With a configured seed every session replays the
    /// same template choices for the same inputs.
    pub fn create_session(&self) -> Session {
        let now = Utc::now();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Session {
            id: Uuid::new_v4(),
            started_at: now,
            last_active: now,
            context: ConversationContext::new(),
            ended: false,
            rng,
        }
    }

    /// True when the session has been idle longer than the timeout.
    pub fn is_expired(&self, session: &Session) -> bool {
        self.is_expired_at(session, Utc::now())
    }

    fn is_expired_at(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let timeout = chrono::Duration::minutes(i64::from(self.session_timeout_minutes));
        now - session.last_active > timeout
    }

    pub fn ends_conversation(&self, intent: &Intent) -> bool {
        self.end_intents.contains(intent)
    }

    /// Write a finished turn back into the session.
    pub fn record(
        &self,
        session: &mut Session,
        result: &ClassificationResult,
        composition: &Composition,
    ) {
        session.context.record_turn(
            result,
            &composition.text,
            composition.template,
            self.history_limit,
        );
        session.last_active = Utc::now();
        if self.ends_conversation(&result.intent) {
            session.ended = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::ResponseKind;
    use voxbot_core::types::EntityMap;

    fn manager() -> SessionManager {
        SessionManager::new(&SessionConfig::default(), None)
    }

    fn turn(intent: &str) -> (ClassificationResult, Composition) {
        let result = ClassificationResult {
            intent: Intent::new(intent),
            confidence: 1.0,
            entities: EntityMap::new(),
            raw_text: format!("{} please", intent),
        };
        let composition = Composition {
            text: "ok".to_string(),
            intent: Intent::new(intent),
            template: Some(1),
            kind: ResponseKind::Template,
        };
        (result, composition)
    }

    #[test]
    fn test_create_session() {
        let session = manager().create_session();
        assert_eq!(session.context.turn_count, 0);
        assert!(session.context.history.is_empty());
        assert!(!session.ended);
        assert_eq!(session.started_at, session.last_active);
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let m = manager();
        assert_ne!(m.create_session().id, m.create_session().id);
    }

    #[test]
    fn test_record_updates_context() {
        let m = manager();
        let mut session = m.create_session();
        let (result, composition) = turn("support");
        m.record(&mut session, &result, &composition);

        assert_eq!(session.context.turn_count, 1);
        assert_eq!(session.context.last_intent, Some(Intent::new("support")));
        assert_eq!(session.context.history[0].template, Some(1));
        assert_eq!(session.context.history[0].response, "ok");
        assert!(!session.ended);
    }

    #[test]
    fn test_end_intent_marks_session_ended() {
        let m = manager();
        let mut session = m.create_session();
        let (result, composition) = turn("farewell");
        m.record(&mut session, &result, &composition);
        assert!(session.ended);
        assert!(session.summary().ended);
    }

    #[test]
    fn test_history_limit_applied() {
        let config = SessionConfig {
            history_limit: 3,
            ..SessionConfig::default()
        };
        let m = SessionManager::new(&config, None);
        let mut session = m.create_session();
        for _ in 0..10 {
            let (result, composition) = turn("support");
            m.record(&mut session, &result, &composition);
        }
        assert_eq!(session.context.history.len(), 3);
        assert_eq!(session.summary().turn_count, 10);
    }

    #[test]
    fn test_expiry() {
        let m = manager();
        let mut session = m.create_session();
        assert!(!m.is_expired(&session));

        session.last_active = Utc::now() - chrono::Duration::minutes(31);
        assert!(m.is_expired(&session));

        let now = session.last_active + chrono::Duration::minutes(30);
        assert!(!m.is_expired_at(&session, now));
    }

    #[test]
    fn test_seeded_sessions_share_random_sequence() {
        use rand::Rng;
        let m = SessionManager::new(&SessionConfig::default(), Some(42));
        let mut a = m.create_session();
        let mut b = m.create_session();
        let xs: Vec<u32> = (0..5).map(|_| a.rng().random_range(0..1000)).collect();
        let ys: Vec<u32> = (0..5).map(|_| b.rng().random_range(0..1000)).collect();
        assert_eq!(xs, ys);
    }
}
