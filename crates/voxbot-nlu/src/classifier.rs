//! Intent classification strategies.
//!
//! The rest of the system depends only on [`IntentClassifier`]; the keyword
//! matcher here is one implementation of it.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use voxbot_core::config::{ClassifierConfig, VoxbotConfig};
use voxbot_core::error::Result;
use voxbot_core::intents::IntentTable;
use voxbot_core::text::{contains_phrase, normalize};
use voxbot_core::types::{ClassificationResult, ConversationContext, Intent};

use crate::entity::EntityExtractor;

/// A classification strategy.
///
/// Implementations must be total: every input yields a result, and the
/// context is only read.
pub trait IntentClassifier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Classify one utterance given the current conversation context.
    fn classify(&self, utterance: &str, context: &ConversationContext) -> ClassificationResult;
}

/// How well one intent matched an utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentScore {
    pub intent: Intent,
    /// Keywords and phrases found, in table order.
    pub matched: Vec<String>,
    pub total_keywords: usize,
    /// `matched / total_keywords`.
    pub score: f32,
    pub priority: usize,
}

/// Keyword and phrase matcher over a fixed [`IntentTable`].
pub struct KeywordClassifier {
    table: Arc<IntentTable>,
    config: ClassifierConfig,
    extractor: EntityExtractor,
}

impl KeywordClassifier {
    pub fn new(
        table: Arc<IntentTable>,
        config: ClassifierConfig,
        extractor: EntityExtractor,
    ) -> Self {
        Self {
            table,
            config,
            extractor,
        }
    }

    /// Build the table, extractor and classifier from a loaded config.
    pub fn from_config(config: &VoxbotConfig) -> Result<Self> {
        let table = Arc::new(IntentTable::from_config(config)?);
        let extractor = EntityExtractor::from_config(&config.entities)?;
        Ok(Self::new(table, config.classifier.clone(), extractor))
    }

    pub fn table(&self) -> &Arc<IntentTable> {
        &self.table
    }

    /// Score every intent that matched at least one keyword.
    ///
    /// Sorted best first: highest score, then lowest priority (declaration
    /// order) on exact ties.
    pub fn scores(&self, utterance: &str) -> Vec<IntentScore> {
        let normalized = normalize(utterance);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<IntentScore> = self
            .table
            .scorable()
            .filter_map(|def| {
                let matched: Vec<String> = def
                    .keywords
                    .iter()
                    .filter(|kw| contains_phrase(&normalized, kw, self.config.match_mode))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                let total = def.keywords.len();
                Some(IntentScore {
                    intent: def.intent.clone(),
                    score: matched.len() as f32 / total as f32,
                    matched,
                    total_keywords: total,
                    priority: def.priority,
                })
            })
            .collect();

        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.priority.cmp(&b.priority))
        });
        scores
    }

    /// Turn the winning score into a confidence, applying the continuity boost.
    fn confidence(&self, best: &IntentScore, context: &ConversationContext) -> f32 {
        let saturation = best.total_keywords.min(self.config.full_confidence_matches).max(1);
        let base = (best.matched.len() as f32 / saturation as f32).min(1.0);
        if context.last_intent.as_ref() == Some(&best.intent) {
            (base * self.config.continuity_boost).min(1.0)
        } else {
            base
        }
    }
}

impl IntentClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    fn classify(&self, utterance: &str, context: &ConversationContext) -> ClassificationResult {
        let entities = self.extractor.extract(utterance);

        let Some(best) = self.scores(utterance).into_iter().next() else {
            debug!(entities = entities.len(), "No keyword matched; classified as unknown");
            return ClassificationResult::unknown(utterance, entities);
        };

        let confidence = self.confidence(&best, context);
        debug!(
            intent = %best.intent,
            confidence,
            matched = ?best.matched,
            "Utterance classified"
        );

        ClassificationResult {
            intent: best.intent,
            confidence,
            entities,
            raw_text: utterance.to_string(),
        }
    }
}
