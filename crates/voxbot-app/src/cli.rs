//! CLI argument definitions for the `voxbot` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Voxbot: a keyword-driven customer-service assistant.
#[derive(Parser, Debug)]
#[command(name = "voxbot", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Seed for template selection, overriding `responses.seed`.
    #[arg(long = "seed", global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Talk to the assistant on stdin/stdout (default).
    Chat,
    /// Classify one utterance and show per-intent scores.
    Classify {
        /// The utterance; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Run every non-empty line of a file as one conversation.
    Replay {
        file: PathBuf,
    },
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }

    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > VOXBOT_CONFIG env var > ~/.voxbot/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("VOXBOT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > RUST_LOG env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            if !level.trim().is_empty() {
                return level;
            }
        }
        config_level.to_string()
    }

    /// Resolve the template selection seed.
    ///
    /// Priority: --seed flag > config file value.
    pub fn resolve_seed(&self, config_seed: Option<u64>) -> Option<u64> {
        self.seed.or(config_seed)
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".voxbot").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".voxbot").join("config.toml");
    }
    PathBuf::from("config.toml")
}
