use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VoxbotError};
use crate::intents::IntentTable;
use crate::text::MatchMode;
use crate::types::UNKNOWN_INTENT;

/// Top-level configuration for the assistant.
///
/// Loaded from `~/.voxbot/config.toml` by default. The intent and template
/// tables are read once here and stay immutable for the life of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxbotConfig {
    /// Optional JSON file with extra FAQ entries, resolved relative to the
    /// config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_file: Option<PathBuf>,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub entities: EntityConfig,
    #[serde(default)]
    pub responses: ResponseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Declared intents. Order is the tie-break priority.
    #[serde(default = "default_intents")]
    pub intents: Vec<IntentConfig>,
    #[serde(default)]
    pub faqs: Vec<FaqEntry>,
    /// FAQs read from `faq_file`; kept apart so `save` does not inline them.
    #[serde(skip)]
    pub file_faqs: Vec<FaqEntry>,
}

impl Default for VoxbotConfig {
    fn default() -> Self {
        Self {
            faq_file: None,
            general: GeneralConfig::default(),
            classifier: ClassifierConfig::default(),
            entities: EntityConfig::default(),
            responses: ResponseConfig::default(),
            session: SessionConfig::default(),
            intents: default_intents(),
            faqs: Vec::new(),
            file_faqs: Vec::new(),
        }
    }
}

impl VoxbotConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: VoxbotConfig = toml::from_str(&content)?;

        if let Some(ref faq_path) = config.faq_file {
            let resolved = match path.parent() {
                Some(dir) if faq_path.is_relative() => dir.join(faq_path),
                _ => faq_path.clone(),
            };
            let raw = std::fs::read_to_string(&resolved)?;
            config.file_faqs = serde_json::from_str(&raw)?;
            info!(
                count = config.file_faqs.len(),
                "FAQ entries loaded from {}",
                resolved.display()
            );
        }

        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults only when the file does
    /// not exist. A file that exists but is invalid is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(
                "No configuration at {}, using built-in defaults",
                path.display()
            );
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// All FAQ entries, inline ones first.
    pub fn all_faqs(&self) -> impl Iterator<Item = &FaqEntry> {
        self.faqs.iter().chain(self.file_faqs.iter())
    }

    /// Check every load-time invariant. Any failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        IntentTable::from_config(self)?;

        if self.classifier.full_confidence_matches == 0 {
            return Err(invalid_setting(
                "classifier.full_confidence_matches",
                "must be at least 1",
            ));
        }
        if !(self.classifier.continuity_boost >= 1.0) {
            return Err(invalid_setting(
                "classifier.continuity_boost",
                "must be a factor of at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.responses.clarification_threshold) {
            return Err(invalid_setting(
                "responses.clarification_threshold",
                "must be within [0, 1]",
            ));
        }
        if self
            .responses
            .clarification_templates
            .iter()
            .all(|t| t.trim().is_empty())
        {
            return Err(invalid_setting(
                "responses.clarification_templates",
                "at least one non-empty template is required",
            ));
        }
        if self.responses.apology.trim().is_empty() {
            return Err(invalid_setting("responses.apology", "must not be empty"));
        }
        if self.session.history_limit < self.responses.anti_repetition_window {
            return Err(invalid_setting(
                "session.history_limit",
                &format!(
                    "must be at least responses.anti_repetition_window ({})",
                    self.responses.anti_repetition_window
                ),
            ));
        }

        for pattern in &self.entities.date_patterns {
            compile_pattern("date", pattern)?;
        }
        for custom in &self.entities.custom {
            let reserved = matches!(custom.kind.as_str(), "number" | "email" | "date");
            if reserved || custom.kind.is_empty() {
                return Err(invalid_setting(
                    "entities.custom.kind",
                    &format!("'{}' is reserved or empty", custom.kind),
                ));
            }
            compile_pattern(&custom.kind, &custom.pattern)?;
        }

        for intent in &self.intents {
            for template in &intent.templates {
                if !braces_balanced(template) {
                    warn!(
                        intent = %intent.name,
                        template = %template,
                        "Template looks malformed; it will fall back to the apology response"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Compile a user-supplied regex, mapping failures to a config error.
pub fn compile_pattern(kind: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| VoxbotError::InvalidPattern {
        kind: kind.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn invalid_setting(field: &str, reason: &str) -> VoxbotError {
    VoxbotError::InvalidSetting {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Cheap structural check used only for load-time warnings.
fn braces_balanced(template: &str) -> bool {
    let mut braces = 0i32;
    let mut brackets = 0i32;
    for c in template.chars() {
        match c {
            '{' => braces += 1,
            '}' => braces -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            _ => {}
        }
        if braces < 0 || brackets < 0 || braces > 1 || brackets > 1 {
            return false;
        }
    }
    braces == 0 && brackets == 0
}

// =============================================================================
// Sections
// =============================================================================

/// General assistant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Display name used by the CLI.
    pub bot_name: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Printed when an interactive session opens.
    pub greeting_message: String,
    /// Printed when the user leaves with quit/exit.
    pub farewell_message: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bot_name: "CustomerBot".to_string(),
            log_level: "info".to_string(),
            greeting_message:
                "Hello! I am your customer service assistant. How can I help you today?"
                    .to_string(),
            farewell_message: "Thank you for chatting. Goodbye!".to_string(),
        }
    }
}

/// One intent with its trigger keywords and response templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConfig {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub templates: Vec<String>,
}

impl IntentConfig {
    pub fn new(name: &str, keywords: &[&str], templates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            templates: templates.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A frequently asked question, merged into the intent table at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    /// Stable identifier; the intent becomes `faq.<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Keyword scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub match_mode: MatchMode,
    /// Number of keyword matches at which confidence reaches 1.0. Intents
    /// with fewer keywords saturate at their keyword count.
    pub full_confidence_matches: usize,
    /// Multiplier applied to the winning confidence when it repeats the
    /// previous turn's intent. The result is capped at 1.0.
    pub continuity_boost: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            match_mode: MatchMode::WholeWord,
            full_confidence_matches: 1,
            continuity_boost: 1.25,
        }
    }
}

/// Entity recognizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Regexes recognised as dates, all reported under the `date` kind.
    pub date_patterns: Vec<String>,
    /// Additional, configuration-defined entity kinds.
    pub custom: Vec<CustomEntityConfig>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            date_patterns: vec![
                r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b".to_string(),
                r"\b\d{4}-\d{2}-\d{2}\b".to_string(),
                r"(?i)\b(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b".to_string(),
            ],
            custom: Vec::new(),
        }
    }
}

/// A named regex recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEntityConfig {
    pub kind: String,
    pub pattern: String,
}

/// Response composition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Below this confidence the reply asks the user to rephrase.
    pub clarification_threshold: f32,
    pub clarification_templates: Vec<String>,
    /// Prepended on the first turn of every session.
    pub greeting_fragment: String,
    /// Whether to acknowledge a repeated topic.
    pub continuity_acknowledgment: bool,
    pub continuity_fragment: String,
    /// Returned when a template cannot be rendered.
    pub apology: String,
    /// How many of an intent's most recent templates are avoided.
    pub anti_repetition_window: usize,
    pub default_missing_prompt: String,
    /// Seed for per-session template selection. Unset means OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Follow-up question appended when a placeholder has no entity, by kind.
    pub missing_entity_prompts: BTreeMap<String, String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        let mut missing_entity_prompts = BTreeMap::new();
        missing_entity_prompts.insert(
            "number".to_string(),
            "Could you please provide your order number?".to_string(),
        );
        missing_entity_prompts.insert(
            "email".to_string(),
            "Could you provide your email address?".to_string(),
        );
        missing_entity_prompts.insert("date".to_string(), "Which date do you mean?".to_string());

        Self {
            clarification_threshold: 0.3,
            clarification_templates: vec![
                "I'm not sure I understand. Could you please rephrase that?".to_string(),
                "I didn't quite catch that. Could you say it another way?".to_string(),
            ],
            greeting_fragment: "Thanks for reaching out to customer service.".to_string(),
            continuity_acknowledgment: true,
            continuity_fragment: "Let's keep working on this together.".to_string(),
            apology:
                "I'm sorry, I'm having trouble processing your request. Could you try again?"
                    .to_string(),
            anti_repetition_window: 1,
            default_missing_prompt: "Could you provide more information?".to_string(),
            seed: None,
            missing_entity_prompts,
        }
    }
}

/// Session handling settings used by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Intents that close the conversation.
    pub end_intents: Vec<String>,
    /// Maximum message length in characters.
    pub max_message_length: usize,
    /// Idle minutes before a session is discarded.
    pub session_timeout_minutes: u32,
    /// Turns kept in each session's history.
    pub history_limit: usize,
    /// Upper bound for a speech-to-text call.
    pub stt_timeout_secs: u64,
    /// Upper bound for a text-to-speech call.
    pub tts_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            end_intents: vec!["farewell".to_string()],
            max_message_length: 2000,
            session_timeout_minutes: 30,
            history_limit: 50,
            stt_timeout_secs: 10,
            tts_timeout_secs: 10,
        }
    }
}

/// The customer-service intent set the assistant ships with.
pub fn default_intents() -> Vec<IntentConfig> {
    vec![
        IntentConfig::new(
            "greeting",
            &["hello", "hi", "hey", "good morning", "good afternoon", "good evening"],
            &[
                "Hello! How can I assist you today?",
                "Hi there! What can I do for you?",
                "Welcome! I'm here to help you.",
            ],
        ),
        IntentConfig::new(
            "product_info",
            &["product", "item", "price", "cost", "available", "stock"],
            &[
                "I can help you with product information. Which product are you interested in?",
                "Sure! Let me get you the product details. Can you specify the product name?",
            ],
        ),
        IntentConfig::new(
            "order_status",
            &["order", "delivery", "shipping", "track", "status"],
            &[
                "I can check your order status[ for order number {number}].",
                "Let me help you track your order[ {number}].",
            ],
        ),
        IntentConfig::new(
            "account",
            &["account", "profile", "login", "password", "reset"],
            &[
                "I can assist with account-related queries. What do you need help with?",
                "I'm here to help with your account. Please describe your issue.",
            ],
        ),
        IntentConfig::new(
            "support",
            &["help", "support", "issue", "problem", "complaint"],
            &[
                "I'm sorry you're experiencing an issue. Can you describe the problem in detail?",
                "I'm here to help resolve your issue. What seems to be the problem?",
            ],
        ),
        IntentConfig::new(
            "farewell",
            &["bye", "goodbye", "thanks", "thank you", "exit", "quit"],
            &[
                "Thank you for contacting us! Have a great day!",
                "Goodbye! Feel free to reach out if you need anything else.",
                "It was nice helping you. Take care!",
            ],
        ),
        IntentConfig::new(
            UNKNOWN_INTENT,
            &[],
            &[
                "I'm not sure I understand. Could you please rephrase that?",
                "I didn't quite catch that. Can you provide more details?",
                "I'm still learning. Could you ask that in a different way?",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = VoxbotConfig::default();
        assert_eq!(config.general.bot_name, "CustomerBot");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.intents.len(), 7);
        assert_eq!(config.intents.last().unwrap().name, "unknown");
        assert_eq!(config.classifier.match_mode, MatchMode::WholeWord);
        assert_eq!(config.responses.anti_repetition_window, 1);
        assert_eq!(config.session.end_intents, vec!["farewell"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"

[responses]
clarification_threshold = 0.5
"#;
        let file = create_temp_config(content);
        let config = VoxbotConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.responses.clarification_threshold, 0.5);
        // Remaining fields use defaults
        assert_eq!(config.intents.len(), 7);
        assert!(config.responses.continuity_acknowledgment);
    }

    #[test]
    fn test_load_custom_intents_replace_defaults() {
        let content = r#"
[[intents]]
name = "billing"
keywords = ["invoice", "bill"]
templates = ["Let me pull up your invoice."]

[[intents]]
name = "unknown"
templates = ["Sorry?"]
"#;
        let file = create_temp_config(content);
        let config = VoxbotConfig::load(file.path()).unwrap();
        assert_eq!(config.intents.len(), 2);
        assert_eq!(config.intents[0].name, "billing");
    }

    #[test]
    fn test_missing_unknown_is_fatal() {
        let content = r#"
[[intents]]
name = "billing"
keywords = ["invoice"]
templates = ["Let me check."]
"#;
        let file = create_temp_config(content);
        let err = VoxbotConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoxbotError::MissingFallback(_)));
    }

    #[test]
    fn test_intent_without_keywords_is_fatal() {
        let content = r#"
[[intents]]
name = "billing"
keywords = ["  "]
templates = ["Let me check."]

[[intents]]
name = "unknown"
templates = ["Sorry?"]
"#;
        let file = create_temp_config(content);
        let err = VoxbotConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoxbotError::InvalidIntent { .. }));
    }

    #[test]
    fn test_invalid_date_pattern_is_fatal() {
        let content = r#"
[entities]
date_patterns = ["(unclosed"]
"#;
        let file = create_temp_config(content);
        let err = VoxbotConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoxbotError::InvalidPattern { .. }));
    }

    #[test]
    fn test_reserved_custom_kind_is_fatal() {
        let content = r#"
[[entities.custom]]
kind = "email"
pattern = "x"
"#;
        let file = create_temp_config(content);
        let err = VoxbotConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoxbotError::InvalidSetting { .. }));
    }

    #[test]
    fn test_threshold_out_of_range_is_fatal() {
        let mut config = VoxbotConfig::default();
        config.responses.clarification_threshold = 1.5;
        assert!(matches!(
            config.validate().unwrap_err(),
            VoxbotError::InvalidSetting { .. }
        ));
    }

    #[test]
    fn test_boost_below_one_is_fatal() {
        let mut config = VoxbotConfig::default();
        config.classifier.continuity_boost = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_saturation_is_fatal() {
        let mut config = VoxbotConfig::default();
        config.classifier.full_confidence_matches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_shorter_than_repetition_window_is_fatal() {
        let mut config = VoxbotConfig::default();
        config.session.history_limit = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            VoxbotError::InvalidSetting { ref field, .. } if field == "session.history_limit"
        ));

        config.responses.anti_repetition_window = 3;
        config.session.history_limit = 2;
        assert!(config.validate().is_err());

        config.session.history_limit = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_clarification_templates_is_fatal() {
        let mut config = VoxbotConfig::default();
        config.responses.clarification_templates = vec![String::new()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is not [valid toml");
        let err = VoxbotConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, VoxbotError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            VoxbotConfig::load_or_default(Path::new("/nonexistent/voxbot/config.toml")).unwrap();
        assert_eq!(config.general.bot_name, "CustomerBot");
    }

    #[test]
    fn test_load_or_default_invalid_file_is_error() {
        let file = create_temp_config("[classifier]\nfull_confidence_matches = 0\n");
        assert!(VoxbotConfig::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = VoxbotConfig::default();
        config.responses.seed = Some(7);
        config.faqs.push(FaqEntry {
            id: Some("hours".into()),
            question: "What are your business hours?".into(),
            answer: "We are available 24/7.".into(),
            category: "general".into(),
            keywords: vec!["hours".into(), "open".into()],
        });
        config.save(&path).unwrap();

        let reloaded = VoxbotConfig::load(&path).unwrap();
        assert_eq!(reloaded.intents, config.intents);
        assert_eq!(reloaded.faqs, config.faqs);
        assert_eq!(reloaded.responses.seed, Some(7));
    }

    #[test]
    fn test_faq_file_is_loaded_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("faqs.json"),
            r#"[{"id": "returns", "question": "What is your return policy?",
                 "answer": "We offer a 30-day return policy.", "category": "returns",
                 "keywords": ["return", "refund"]}]"#,
        )
        .unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "faq_file = \"faqs.json\"\n").unwrap();

        let config = VoxbotConfig::load(&config_path).unwrap();
        assert!(config.faqs.is_empty());
        assert_eq!(config.file_faqs.len(), 1);
        assert_eq!(config.all_faqs().count(), 1);
    }

    #[test]
    fn test_missing_faq_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "faq_file = \"absent.json\"\n").unwrap();
        assert!(matches!(
            VoxbotConfig::load(&config_path).unwrap_err(),
            VoxbotError::Io(_)
        ));
    }

    #[test]
    fn test_braces_balanced() {
        assert!(braces_balanced("Order[ {number}] ready."));
        assert!(!braces_balanced("Order {number"));
        assert!(!braces_balanced("Order [[nested]]"));
        assert!(!braces_balanced("Close } first {"));
    }

    #[test]
    fn test_shipped_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/voxbot.toml");
        let config = VoxbotConfig::load(&path).unwrap();
        assert_eq!(config.file_faqs.len(), 3);
        assert_eq!(config.entities.custom[0].kind, "sku");
        assert_eq!(config.intents.len(), default_intents().len());
        let table = IntentTable::from_config(&config).unwrap();
        assert_eq!(table.len(), default_intents().len() + 3);
    }
}

