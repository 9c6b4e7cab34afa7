//! Entity extraction from raw utterances.

use regex::Regex;
use voxbot_core::config::{compile_pattern, EntityConfig};
use voxbot_core::error::Result;
use voxbot_core::types::{EntityKind, EntityMap};

/// One entity kind and the regexes that recognise it.
struct Recognizer {
    kind: EntityKind,
    patterns: Vec<Regex>,
}

/// Extracts numbers, emails, dates and configured custom kinds.
///
/// Runs over the raw utterance, not the normalized one, so email addresses
/// and date separators survive.
pub struct EntityExtractor {
    recognizers: Vec<Recognizer>,
}

impl EntityExtractor {
    /// Build the recognizers, compiling configured patterns.
    pub fn from_config(config: &EntityConfig) -> Result<Self> {
        let mut recognizers = vec![
            Recognizer {
                kind: EntityKind::Number,
                patterns: vec![compile_pattern("number", r"[0-9]+")?],
            },
            Recognizer {
                kind: EntityKind::Email,
                patterns: vec![compile_pattern(
                    "email",
                    r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                )?],
            },
        ];

        let dates = config
            .date_patterns
            .iter()
            .map(|p| compile_pattern("date", p))
            .collect::<Result<Vec<_>>>()?;
        recognizers.push(Recognizer {
            kind: EntityKind::Date,
            patterns: dates,
        });

        for custom in &config.custom {
            recognizers.push(Recognizer {
                kind: EntityKind::from(custom.kind.as_str()),
                patterns: vec![compile_pattern(&custom.kind, &custom.pattern)?],
            });
        }

        Ok(Self { recognizers })
    }

    /// Extract every recognised entity. Values within a kind are ordered by
    /// position in the text, duplicates dropped.
    pub fn extract(&self, text: &str) -> EntityMap {
        let mut entities = EntityMap::new();
        for recognizer in &self.recognizers {
            let mut found: Vec<(usize, &str)> = recognizer
                .patterns
                .iter()
                .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.as_str())))
                .collect();
            found.sort_by_key(|(start, _)| *start);
            for (_, value) in found {
                entities.push(recognizer.kind.clone(), value);
            }
        }
        entities
    }
}
