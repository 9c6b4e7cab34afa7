//! Response composition.
//!
//! Turns a [`ClassificationResult`] plus the session's context into the
//! text that is spoken back. Composition is total: every path ends in a
//! non-empty string, falling back to the configured apology.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use voxbot_core::config::ResponseConfig;
use voxbot_core::intents::{IntentSource, IntentTable};
use voxbot_core::types::{ClassificationResult, ConversationContext, EntityKind, Intent};

use crate::template::{Template, TemplateError};

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// One of the intent's templates.
    Template,
    /// Confidence was below the threshold; the user is asked to rephrase.
    Clarification,
    /// Something went wrong and the apology was used.
    Fallback,
}

/// A composed response plus what the caller needs to write back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    pub text: String,
    /// The classified intent, kept even for clarifications.
    pub intent: Intent,
    /// Index of the intent template used, for anti-repetition.
    pub template: Option<usize>,
    pub kind: ResponseKind,
}

type Parsed = Result<Template, TemplateError>;

/// Builds responses from the intent table's templates.
pub struct ResponseComposer {
    table: Arc<IntentTable>,
    config: ResponseConfig,
    templates: HashMap<Intent, Vec<Parsed>>,
    clarifications: Vec<Parsed>,
}

impl ResponseComposer {
    /// Parse every template up front. Malformed ones are kept as errors and
    /// produce the apology if ever selected. FAQ answers are not parsed and
    /// come back exactly as written.
    pub fn new(table: Arc<IntentTable>, config: ResponseConfig) -> Self {
        let templates = table
            .iter()
            .map(|def| {
                let parsed = def
                    .templates
                    .iter()
                    .map(|t| match def.source {
                        IntentSource::Faq => Ok(Template::literal(t)),
                        _ => parse_logged(def.intent.as_str(), t),
                    })
                    .collect();
                (def.intent.clone(), parsed)
            })
            .collect();
        let clarifications = config
            .clarification_templates
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| parse_logged("clarification", t))
            .collect();

        Self {
            table,
            config,
            templates,
            clarifications,
        }
    }

    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    /// Compose with the thread-local RNG.
    pub fn compose(&self, result: &ClassificationResult, context: &ConversationContext) -> String {
        self.compose_with(result, context, &mut rand::rng()).text
    }

    /// Compose using the supplied random source for template selection.
    pub fn compose_with<R: Rng>(
        &self,
        result: &ClassificationResult,
        context: &ConversationContext,
        rng: &mut R,
    ) -> Composition {
        let (body, template, kind) = if result.confidence < self.config.clarification_threshold {
            debug!(
                intent = %result.intent,
                confidence = result.confidence,
                "Confidence below threshold, asking to rephrase"
            );
            let body = pick(&self.clarifications, rng)
                .and_then(|t| self.fill(t, result))
                .unwrap_or_default();
            (body, None, ResponseKind::Clarification)
        } else {
            let candidates = self.candidates(&result.intent);
            let index = self.select(candidates.len(), &result.intent, context, rng);
            let body = candidates
                .get(index)
                .and_then(|t| self.fill(t, result))
                .unwrap_or_default();
            (body, Some(index), ResponseKind::Template)
        };

        let (mut text, template, kind) = if body.trim().is_empty() {
            warn!(intent = %result.intent, "Composition produced no text, using apology");
            (self.config.apology.clone(), None, ResponseKind::Fallback)
        } else {
            (body, template, kind)
        };

        let continuing = context.last_intent.as_ref() == Some(&result.intent);
        if self.config.continuity_acknowledgment
            && continuing
            && kind == ResponseKind::Template
            && !result.intent.is_unknown()
        {
            append(&mut text, &self.config.continuity_fragment);
        }
        if context.is_first_turn() {
            text = prepend(&self.config.greeting_fragment, text);
        }

        Composition {
            text,
            intent: result.intent.clone(),
            template,
            kind,
        }
    }

    /// Parsed templates for an intent, or the `unknown` ones.
    fn candidates(&self, intent: &Intent) -> &[Parsed] {
        match self.templates.get(intent) {
            Some(list) if !list.is_empty() => list,
            _ => self
                .templates
                .get(&self.table.unknown().intent)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    /// Uniform choice among templates not used in the last
    /// `anti_repetition_window` turns of this intent. Repeats are allowed
    /// once every template is excluded.
    fn select<R: Rng>(
        &self,
        count: usize,
        intent: &Intent,
        context: &ConversationContext,
        rng: &mut R,
    ) -> usize {
        if count <= 1 {
            return 0;
        }
        let recent = context.recent_templates(intent, self.config.anti_repetition_window);
        let allowed: Vec<usize> = (0..count).filter(|i| !recent.contains(i)).collect();
        if allowed.is_empty() {
            rng.random_range(0..count)
        } else {
            allowed[rng.random_range(0..allowed.len())]
        }
    }

    /// Render a template and append prompts for missing entities. `None`
    /// when the template is malformed.
    fn fill(&self, parsed: &Parsed, result: &ClassificationResult) -> Option<String> {
        let template = parsed.as_ref().ok()?;
        let rendered = template.render(&result.entities);
        let mut text = rendered.text;
        for kind in &rendered.missing {
            debug!(kind = %kind, "Template placeholder has no entity");
            append(&mut text, self.missing_prompt(kind));
        }
        Some(text)
    }

    fn missing_prompt(&self, kind: &EntityKind) -> &str {
        self.config
            .missing_entity_prompts
            .get(kind.as_str())
            .unwrap_or(&self.config.default_missing_prompt)
    }
}

fn parse_logged(owner: &str, source: &str) -> Parsed {
    let parsed = Template::parse(source);
    if let Err(ref e) = parsed {
        warn!(owner, template = source, error = %e, "Malformed response template");
    }
    parsed
}

fn pick<'a, T, R: Rng>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        Some(&items[rng.random_range(0..items.len())])
    }
}

fn append(text: &mut String, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(fragment);
}

fn prepend(fragment: &str, text: String) -> String {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        text
    } else {
        format!("{} {}", fragment, text)
    }
}
