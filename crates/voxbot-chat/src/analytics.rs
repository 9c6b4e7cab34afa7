//! In-memory turn statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use voxbot_core::types::Intent;

use crate::composer::ResponseKind;

#[derive(Debug, Default, Clone)]
struct IntentTally {
    count: u64,
    confidence_sum: f64,
    response_time_sum: Duration,
}

/// Running counters for everything the assistant has handled.
#[derive(Debug, Clone)]
pub struct SessionAnalytics {
    started_at: DateTime<Utc>,
    total_turns: u64,
    failed_turns: u64,
    clarifications: u64,
    intents: BTreeMap<Intent, IntentTally>,
    errors: BTreeMap<String, u64>,
}

impl Default for SessionAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAnalytics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_turns: 0,
            failed_turns: 0,
            clarifications: 0,
            intents: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }

    /// Count one handled turn. A turn answered with the apology counts as
    /// failed.
    pub fn record_turn(
        &mut self,
        intent: &Intent,
        confidence: f32,
        kind: ResponseKind,
        elapsed: Duration,
    ) {
        self.total_turns += 1;
        match kind {
            ResponseKind::Fallback => self.failed_turns += 1,
            ResponseKind::Clarification => self.clarifications += 1,
            ResponseKind::Template => {}
        }
        let tally = self.intents.entry(intent.clone()).or_default();
        tally.count += 1;
        tally.confidence_sum += f64::from(confidence);
        tally.response_time_sum += elapsed;
    }

    pub fn record_error(&mut self, kind: &str) {
        *self.errors.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let successful_turns = self.total_turns - self.failed_turns;
        let success_rate = if self.total_turns == 0 {
            0.0
        } else {
            successful_turns as f64 / self.total_turns as f64 * 100.0
        };

        let intents = self
            .intents
            .iter()
            .map(|(intent, tally)| {
                let n = tally.count.max(1) as f64;
                IntentSummary {
                    intent: intent.clone(),
                    count: tally.count,
                    average_confidence: tally.confidence_sum / n,
                    average_response_ms: tally.response_time_sum.as_secs_f64() * 1000.0 / n,
                }
            })
            .collect();

        AnalyticsSnapshot {
            session_start: self.started_at,
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0),
            total_turns: self.total_turns,
            successful_turns,
            failed_turns: self.failed_turns,
            clarifications: self.clarifications,
            success_rate,
            intents,
            total_errors: self.errors.values().sum(),
            error_types: self.errors.clone(),
        }
    }
}

/// Per-intent figures in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentSummary {
    pub intent: Intent,
    pub count: u64,
    pub average_confidence: f64,
    pub average_response_ms: f64,
}

/// Point-in-time copy of the analytics counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub session_start: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub total_turns: u64,
    pub successful_turns: u64,
    pub failed_turns: u64,
    pub clarifications: u64,
    /// Percentage of turns not answered with the apology.
    pub success_rate: f64,
    pub intents: Vec<IntentSummary>,
    pub total_errors: u64,
    pub error_types: BTreeMap<String, u64>,
}

impl AnalyticsSnapshot {
    pub fn intent(&self, intent: &str) -> Option<&IntentSummary> {
        self.intents.iter().find(|s| s.intent == intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let snap = SessionAnalytics::new().snapshot();
        assert_eq!(snap.total_turns, 0);
        assert_eq!(snap.success_rate, 0.0);
        assert!(snap.intents.is_empty());
        assert_eq!(snap.total_errors, 0);
    }

    #[test]
    fn test_turn_counters() {
        let mut a = SessionAnalytics::new();
        let support = Intent::new("support");
        a.record_turn(&support, 1.0, ResponseKind::Template, Duration::from_millis(4));
        a.record_turn(&support, 0.5, ResponseKind::Template, Duration::from_millis(2));
        a.record_turn(&Intent::unknown(), 0.0, ResponseKind::Clarification, Duration::ZERO);
        a.record_turn(&support, 1.0, ResponseKind::Fallback, Duration::ZERO);

        let snap = a.snapshot();
        assert_eq!(snap.total_turns, 4);
        assert_eq!(snap.failed_turns, 1);
        assert_eq!(snap.successful_turns, 3);
        assert_eq!(snap.clarifications, 1);
        assert_eq!(snap.success_rate, 75.0);

        let s = snap.intent("support").unwrap();
        assert_eq!(s.count, 3);
        assert!((s.average_confidence - 2.5 / 3.0).abs() < 1e-9);
        assert!((s.average_response_ms - 2.0).abs() < 1e-9);
        assert_eq!(snap.intent("unknown").unwrap().count, 1);
    }

    #[test]
    fn test_error_counts_by_type() {
        let mut a = SessionAnalytics::new();
        a.record_error("voice");
        a.record_error("voice");
        a.record_error("message_too_long");
        let snap = a.snapshot();
        assert_eq!(snap.total_errors, 3);
        assert_eq!(snap.error_types["voice"], 2);
        assert_eq!(snap.error_types["message_too_long"], 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut a = SessionAnalytics::new();
        a.record_turn(&Intent::new("greeting"), 1.0, ResponseKind::Template, Duration::ZERO);
        let json = serde_json::to_value(a.snapshot()).unwrap();
        assert_eq!(json["total_turns"], 1);
        assert_eq!(json["intents"][0]["intent"], "greeting");
    }
}
