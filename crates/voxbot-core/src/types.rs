use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the mandatory fallback intent.
pub const UNKNOWN_INTENT: &str = "unknown";

// =============================================================================
// Intent
// =============================================================================

/// An intent tag. The set is open: defaults ship in the config and more can
/// be declared (or merged in from FAQs) at load time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intent(String);

impl Intent {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The fallback intent used when nothing matches.
    pub fn unknown() -> Self {
        Self(UNKNOWN_INTENT.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_INTENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Intent {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for Intent {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Intent {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Kind of value pulled out of an utterance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    /// Maximal run of decimal digits.
    Number,
    /// `local@domain.tld`.
    Email,
    /// Anything matching one of the configured date patterns.
    Date,
    /// A kind declared in `[[entities.custom]]`.
    Custom(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Number => "number",
            EntityKind::Email => "email",
            EntityKind::Date => "date",
            EntityKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s {
            "number" => EntityKind::Number,
            "email" => EntityKind::Email,
            "date" => EntityKind::Date,
            other => EntityKind::Custom(other.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        EntityKind::from(s.as_str())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Entity values grouped by kind. Within a kind, values keep the order in
/// which they first appeared; repeats are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMap(BTreeMap<EntityKind, Vec<String>>);

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value unless it is already recorded for this kind.
    pub fn push(&mut self, kind: EntityKind, value: impl Into<String>) {
        let value = value.into();
        let values = self.0.entry(kind).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    /// All values for a kind, in order of appearance.
    pub fn get(&self, kind: &EntityKind) -> &[String] {
        self.0.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value for a kind, if any.
    pub fn first(&self, kind: &EntityKind) -> Option<&str> {
        self.0.get(kind).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains_kind(&self, kind: &EntityKind) -> bool {
        !self.get(kind).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Number of kinds with at least one value.
    pub fn len(&self) -> usize {
        self.0.values().filter(|v| !v.is_empty()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKind, &[String])> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k, v.as_slice()))
    }

    /// Fold another map in, keeping first-appearance order.
    pub fn merge(&mut self, other: &EntityMap) {
        for (kind, values) in other.iter() {
            for value in values {
                self.push(kind.clone(), value.clone());
            }
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Outcome of classifying one utterance. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub intent: Intent,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f32,
    pub entities: EntityMap,
    /// The utterance exactly as supplied, before normalization.
    pub raw_text: String,
}

impl ClassificationResult {
    /// An `unknown` result with zero confidence.
    pub fn unknown(raw_text: impl Into<String>, entities: EntityMap) -> Self {
        Self {
            intent: Intent::unknown(),
            confidence: 0.0,
            entities,
            raw_text: raw_text.into(),
        }
    }
}

// =============================================================================
// Conversation context
// =============================================================================

/// One completed exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub utterance: String,
    pub intent: Intent,
    pub response: String,
    /// Index of the template used for `intent`, if a template was used.
    #[serde(default)]
    pub template: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

/// Per-session conversation state.
///
/// Classifiers and composers only read it. The session owner calls
/// [`ConversationContext::record_turn`] after each turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub last_intent: Option<Intent>,
    pub turn_count: u32,
    pub accumulated_entities: EntityMap,
    pub history: Vec<Turn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_first_turn(&self) -> bool {
        self.turn_count == 0
    }

    /// Template indices most recently used for `intent`, newest first, at
    /// most `window` of them.
    pub fn recent_templates(&self, intent: &Intent, window: usize) -> Vec<usize> {
        self.history
            .iter()
            .rev()
            .filter(|turn| &turn.intent == intent)
            .filter_map(|turn| turn.template)
            .take(window)
            .collect()
    }

    /// Write a finished turn back into the context.
    ///
    /// `history_limit` bounds the stored history; `turn_count` keeps counting
    /// regardless.
    pub fn record_turn(
        &mut self,
        result: &ClassificationResult,
        response: &str,
        template: Option<usize>,
        history_limit: usize,
    ) {
        self.turn_count = self.turn_count.saturating_add(1);
        self.last_intent = Some(result.intent.clone());
        self.accumulated_entities.merge(&result.entities);
        self.history.push(Turn {
            utterance: result.raw_text.clone(),
            intent: result.intent.clone(),
            response: response.to_string(),
            template,
            timestamp: Utc::now(),
        });
        if self.history.len() > history_limit {
            let excess = self.history.len() - history_limit;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(intent: &str, raw: &str) -> ClassificationResult {
        ClassificationResult {
            intent: Intent::new(intent),
            confidence: 1.0,
            entities: EntityMap::new(),
            raw_text: raw.to_string(),
        }
    }

    #[test]
    fn test_intent_unknown() {
        assert!(Intent::unknown().is_unknown());
        assert!(!Intent::new("greeting").is_unknown());
        assert_eq!(Intent::unknown(), "unknown");
    }

    #[test]
    fn test_intent_serializes_as_plain_string() {
        let json = serde_json::to_string(&Intent::new("support")).unwrap();
        assert_eq!(json, "\"support\"");
    }

    #[test]
    fn test_entity_kind_round_trips_through_strings() {
        assert_eq!(EntityKind::from("number"), EntityKind::Number);
        assert_eq!(EntityKind::from("email"), EntityKind::Email);
        assert_eq!(EntityKind::from("date"), EntityKind::Date);
        assert_eq!(
            EntityKind::from("order_id"),
            EntityKind::Custom("order_id".into())
        );
        assert_eq!(EntityKind::Custom("sku".into()).to_string(), "sku");
    }

    #[test]
    fn test_entity_map_preserves_order_and_dedups() {
        let mut map = EntityMap::new();
        map.push(EntityKind::Number, "42");
        map.push(EntityKind::Number, "7");
        map.push(EntityKind::Number, "42");
        assert_eq!(map.get(&EntityKind::Number), &["42", "7"]);
        assert_eq!(map.first(&EntityKind::Number), Some("42"));
        assert_eq!(map.first(&EntityKind::Email), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_entity_map_serializes_as_object() {
        let mut map = EntityMap::new();
        map.push(EntityKind::Number, "12345");
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"number": ["12345"]}));
        let back: EntityMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_entity_map_merge() {
        let mut a = EntityMap::new();
        a.push(EntityKind::Number, "1");
        let mut b = EntityMap::new();
        b.push(EntityKind::Number, "1");
        b.push(EntityKind::Number, "2");
        b.push(EntityKind::Email, "a@b.io");
        a.merge(&b);
        assert_eq!(a.get(&EntityKind::Number), &["1", "2"]);
        assert_eq!(a.get(&EntityKind::Email), &["a@b.io"]);
    }

    #[test]
    fn test_empty_entity_map() {
        let map = EntityMap::new();
        assert!(map.is_empty());
        assert_eq!(map.iter().count(), 0);
    }

    #[test]
    fn test_record_turn_updates_context() {
        let mut ctx = ConversationContext::new();
        assert!(ctx.is_first_turn());

        let mut r = result("order_status", "my order is 99");
        r.entities.push(EntityKind::Number, "99");
        ctx.record_turn(&r, "Checking order 99.", Some(1), 10);

        assert_eq!(ctx.turn_count, 1);
        assert_eq!(ctx.last_intent, Some(Intent::new("order_status")));
        assert_eq!(ctx.accumulated_entities.first(&EntityKind::Number), Some("99"));
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].utterance, "my order is 99");
        assert_eq!(ctx.history[0].template, Some(1));
    }

    #[test]
    fn test_record_turn_trims_history_but_keeps_counting() {
        let mut ctx = ConversationContext::new();
        for i in 0..5 {
            ctx.record_turn(&result("support", &format!("turn {}", i)), "ok", Some(0), 2);
        }
        assert_eq!(ctx.turn_count, 5);
        assert_eq!(ctx.history.len(), 2);
        assert_eq!(ctx.history[0].utterance, "turn 3");
        assert_eq!(ctx.history[1].utterance, "turn 4");
    }

    #[test]
    fn test_recent_templates_filters_by_intent() {
        let mut ctx = ConversationContext::new();
        ctx.record_turn(&result("support", "a"), "r", Some(0), 10);
        ctx.record_turn(&result("greeting", "b"), "r", Some(2), 10);
        ctx.record_turn(&result("support", "c"), "r", Some(1), 10);
        ctx.record_turn(&result("support", "d"), "r", None, 10);

        let support = Intent::new("support");
        assert_eq!(ctx.recent_templates(&support, 1), vec![1]);
        assert_eq!(ctx.recent_templates(&support, 5), vec![1, 0]);
        assert_eq!(ctx.recent_templates(&Intent::new("greeting"), 1), vec![2]);
        assert!(ctx.recent_templates(&Intent::new("farewell"), 1).is_empty());
    }
}
