//! Voxbot binary: composition root.
//!
//! 1. Parse CLI arguments and load the TOML configuration
//! 2. Initialise logging
//! 3. Run the requested command against the assistant

mod cli;

use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::Parser;
use serde::Serialize;

use voxbot_chat::{Assistant, TurnOutcome};
use voxbot_core::config::VoxbotConfig;
use voxbot_core::intents::{IntentSource, IntentTable};
use voxbot_core::types::ConversationContext;
use voxbot_nlu::{IntentClassifier, IntentScore, KeywordClassifier};

use cli::{CliArgs, Command};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> AppResult<()> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = VoxbotConfig::load_or_default(&config_file)?;
    config.responses.seed = args.resolve_seed(config.responses.seed);

    // Logs go to stderr so command output on stdout stays machine-readable.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        path = %config_file.display(),
        "Starting Voxbot v{}",
        env!("CARGO_PKG_VERSION")
    );

    match args.command() {
        Command::Chat => run_chat(&config),
        Command::Classify { text, json } => run_classify(&config, &text.join(" "), json),
        Command::Replay { file } => run_replay(&config, &file),
        Command::CheckConfig => run_check_config(&config, &config_file),
    }
}

/// Interactive session on stdin/stdout.
fn run_chat(config: &VoxbotConfig) -> AppResult<()> {
    let assistant = Assistant::new(config)?;
    let session_id = assistant.start_session()?;
    let bot = &config.general.bot_name;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    writeln!(stdout, "{}: {}", bot, config.general.greeting_message)?;
    writeln!(stdout, "(type 'quit' to leave)")?;

    loop {
        write!(stdout, "You: ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q") {
            writeln!(stdout, "{}: {}", bot, config.general.farewell_message)?;
            break;
        }

        match assistant.handle_text(session_id, line) {
            Ok(outcome) => {
                writeln!(stdout, "{}: {}", bot, outcome.response)?;
                if outcome.ends_conversation {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Turn rejected");
                writeln!(stdout, "{}: {}", bot, e)?;
            }
        }
    }

    let stats = assistant.stats();
    tracing::info!(
        turns = stats.total_turns,
        clarifications = stats.clarifications,
        success_rate = stats.success_rate,
        "Chat finished"
    );
    assistant.end_session(session_id)?;
    Ok(())
}

#[derive(Serialize)]
struct ClassifyReport<'a> {
    #[serde(flatten)]
    result: voxbot_core::types::ClassificationResult,
    scores: &'a [IntentScore],
}

fn run_classify(config: &VoxbotConfig, text: &str, json: bool) -> AppResult<()> {
    let classifier = KeywordClassifier::from_config(config)?;
    let result = classifier.classify(text, &ConversationContext::new());
    let scores = classifier.scores(text);

    if json {
        let report = ClassifyReport {
            result,
            scores: &scores,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("intent:     {}", result.intent);
    println!("confidence: {:.3}", result.confidence);
    for (kind, values) in result.entities.iter() {
        println!("entity:     {} = {}", kind, values.join(", "));
    }
    if !scores.is_empty() {
        println!();
        println!("{:<24} {:>6}  matched", "intent", "score");
        for s in &scores {
            println!(
                "{:<24} {:>6.3}  {} of {}: {}",
                s.intent.as_str(),
                s.score,
                s.matched.len(),
                s.total_keywords,
                s.matched.join(", ")
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ReplayTurn<'a> {
    turn: usize,
    utterance: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<TurnOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One session over the lines of a file, one JSON object per turn, then
/// the analytics snapshot.
fn run_replay(config: &VoxbotConfig, file: &Path) -> AppResult<()> {
    let content = std::fs::read_to_string(file)?;
    let assistant = Assistant::new(config)?;
    let mut session_id = assistant.start_session()?;

    let lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    for (i, utterance) in lines.enumerate() {
        let line = match assistant.handle_text(session_id, utterance) {
            Ok(outcome) => {
                session_id = outcome.session_id;
                ReplayTurn {
                    turn: i + 1,
                    utterance,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(e) => ReplayTurn {
                turn: i + 1,
                utterance,
                outcome: None,
                error: Some(e.to_string()),
            },
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    println!("{}", serde_json::to_string(&assistant.stats())?);
    tracing::info!(file = %file.display(), "Replay finished");
    Ok(())
}

fn run_check_config(config: &VoxbotConfig, path: &Path) -> AppResult<()> {
    config.validate()?;
    let table = IntentTable::from_config(config)?;
    let faqs = table.iter().filter(|d| d.source == IntentSource::Faq).count();

    let origin = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    println!("config:      {}", origin);
    println!("bot:         {}", config.general.bot_name);
    println!(
        "intents:     {} declared, {} from FAQs",
        table.len() - faqs,
        faqs
    );
    for def in table.iter() {
        println!(
            "  {:<22} {:>2} keywords, {:>2} templates",
            def.intent.as_str(),
            def.keywords.len(),
            def.templates.len()
        );
    }
    println!("match mode:  {:?}", config.classifier.match_mode);
    println!(
        "thresholds:  clarification < {}, boost x{}",
        config.responses.clarification_threshold, config.classifier.continuity_boost
    );
    println!("configuration OK");
    Ok(())
}
