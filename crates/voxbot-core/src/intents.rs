//! The immutable intent table shared by the classifier and the composer.
//!
//! Built once from [`VoxbotConfig`] (declared intents first, then FAQ
//! entries) and never modified afterwards, so it can be shared across
//! sessions behind an `Arc` without locking.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::{FaqEntry, IntentConfig, VoxbotConfig};
use crate::error::{Result, VoxbotError};
use crate::text::normalize;
use crate::types::{Intent, UNKNOWN_INTENT};

/// Where an intent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Declared,
    Faq,
}

/// A loaded intent: normalized keywords plus raw templates.
#[derive(Debug, Clone)]
pub struct IntentDef {
    pub intent: Intent,
    /// Normalized, de-duplicated keywords and phrases.
    pub keywords: Vec<String>,
    pub templates: Vec<String>,
    /// Position in the table; lower wins ties.
    pub priority: usize,
    pub source: IntentSource,
}

/// Ordered intent table with a guaranteed `unknown` entry.
#[derive(Debug, Clone)]
pub struct IntentTable {
    defs: Vec<IntentDef>,
    index: HashMap<Intent, usize>,
    unknown: usize,
}

impl IntentTable {
    /// Build and validate the table.
    pub fn from_config(config: &VoxbotConfig) -> Result<Self> {
        let mut defs: Vec<IntentDef> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for declared in &config.intents {
            if !seen.insert(declared.name.clone()) {
                return Err(VoxbotError::DuplicateIntent(declared.name.clone()));
            }
            let priority = defs.len();
            defs.push(declared_intent(declared, priority)?);
        }

        for (i, faq) in config.all_faqs().enumerate() {
            let name = match faq.id {
                Some(ref id) => format!("faq.{}", id),
                None => format!("faq.{}", i + 1),
            };
            if !seen.insert(name.clone()) {
                return Err(VoxbotError::DuplicateIntent(name));
            }
            let priority = defs.len();
            defs.push(faq_intent(name, faq, priority)?);
        }

        let unknown = defs
            .iter()
            .position(|d| d.intent.is_unknown())
            .ok_or_else(|| VoxbotError::MissingFallback(UNKNOWN_INTENT.to_string()))?;

        let index = defs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.intent.clone(), i))
            .collect();

        debug!(intents = defs.len(), "Intent table built");
        Ok(Self {
            defs,
            index,
            unknown,
        })
    }

    /// All intents in priority order, `unknown` included.
    pub fn iter(&self) -> impl Iterator<Item = &IntentDef> {
        self.defs.iter()
    }

    /// Intents that can win a keyword match (everything except `unknown`).
    pub fn scorable(&self) -> impl Iterator<Item = &IntentDef> {
        self.defs.iter().filter(|d| !d.intent.is_unknown())
    }

    pub fn get(&self, intent: &Intent) -> Option<&IntentDef> {
        self.index.get(intent).map(|&i| &self.defs[i])
    }

    pub fn unknown(&self) -> &IntentDef {
        &self.defs[self.unknown]
    }

    /// Templates for `intent`, or the `unknown` templates when the intent is
    /// not in the table or has none.
    pub fn templates_for(&self, intent: &Intent) -> &[String] {
        match self.get(intent) {
            Some(def) if !def.templates.is_empty() => &def.templates,
            _ => &self.unknown().templates,
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn declared_intent(declared: &IntentConfig, priority: usize) -> Result<IntentDef> {
    let invalid = |reason: &str| VoxbotError::InvalidIntent {
        intent: declared.name.clone(),
        reason: reason.to_string(),
    };

    if declared.name.trim().is_empty() {
        return Err(invalid("intent name must not be empty"));
    }
    if declared.templates.iter().any(|t| t.trim().is_empty()) {
        return Err(invalid("templates must not be empty strings"));
    }
    if declared.templates.is_empty() {
        return Err(invalid("at least one response template is required"));
    }

    let keywords = normalize_keywords(&declared.keywords);
    if declared.name == UNKNOWN_INTENT {
        if !keywords.is_empty() {
            return Err(invalid("the fallback intent cannot declare keywords"));
        }
    } else if keywords.is_empty() {
        return Err(invalid("at least one non-empty keyword is required"));
    }

    Ok(IntentDef {
        intent: Intent::new(declared.name.clone()),
        keywords,
        templates: declared.templates.clone(),
        priority,
        source: IntentSource::Declared,
    })
}

fn faq_intent(name: String, faq: &FaqEntry, priority: usize) -> Result<IntentDef> {
    let keywords = normalize_keywords(&faq.keywords);
    if keywords.is_empty() {
        return Err(VoxbotError::InvalidIntent {
            intent: name,
            reason: "FAQ entries need at least one keyword".to_string(),
        });
    }
    if faq.answer.trim().is_empty() {
        return Err(VoxbotError::InvalidIntent {
            intent: name,
            reason: "FAQ answer must not be empty".to_string(),
        });
    }
    Ok(IntentDef {
        intent: Intent::new(name),
        keywords,
        templates: vec![faq.answer.clone()],
        priority,
        source: IntentSource::Faq,
    })
}

fn normalize_keywords(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for keyword in raw {
        let normalized = normalize(keyword);
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}
