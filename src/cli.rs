//! Command-line interface built on clap.
//!
//! [`Cli`] carries the global flags (paths, logging) and the [`Command`]
//! to run. Flags override `rulebook.toml` and the environment.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{DEFAULT_CONFIG_FILE, RulebookConfig};

/// Publishes Korean rule documents with English translations.
#[derive(Debug, Parser)]
#[command(name = "rulebook-i18n", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Root of the rule sources.
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Root of the publish tree.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// KR → EN glossary (JSON object).
    #[arg(long, global = true)]
    pub glossary: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the Korean and English publish trees.
    Build {
        /// Exit non-zero and stop at the first failed document.
        #[arg(long)]
        strict: bool,

        /// Maximum translation calls per minute.
        #[arg(long)]
        rpm: Option<u32>,

        /// Attempts per call, including the first.
        #[arg(long)]
        max_retries: Option<u32>,

        /// Gemini model id.
        #[arg(long)]
        model: Option<String>,

        /// Remove the publish tree first, forcing retranslation.
        #[arg(long)]
        clean: bool,

        /// Hide the progress bar.
        #[arg(long)]
        no_progress: bool,
    },

    /// Show which documents are up to date, pending, or failed.
    Status,
}

impl Cli {
    /// Applies the flags that were given on top of `config`.
    pub fn apply_overrides(&self, config: &mut RulebookConfig) {
        if let Some(source) = &self.source {
            config.source_dir = source.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(glossary) = &self.glossary {
            config.glossary_path = glossary.clone();
        }
        if let Command::Build {
            strict,
            rpm,
            max_retries,
            model,
            ..
        } = &self.command
        {
            if *strict {
                config.strict_fail = true;
            }
            if let Some(rpm) = rpm {
                config.rpm = *rpm;
            }
            if let Some(max) = max_retries {
                config.max_retry = *max;
            }
            if let Some(model) = model {
                config.model = model.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_build_subcommand() {
        let cli = Cli::parse_from(["rulebook-i18n", "build", "--strict", "--rpm", "2", "--clean"]);
        match cli.command {
            Command::Build {
                strict,
                rpm,
                max_retries,
                clean,
                no_progress,
                ..
            } => {
                assert!(strict);
                assert_eq!(rpm, Some(2));
                assert!(max_retries.is_none());
                assert!(clean);
                assert!(!no_progress);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "rulebook-i18n",
            "--source",
            "rules",
            "--log-format",
            "json",
            "-vv",
            "status",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.source, Some(PathBuf::from("rules")));
        assert_eq!(cli.config, PathBuf::from("rulebook.toml"));
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "rulebook-i18n",
            "--output",
            "site/rules",
            "build",
            "--max-retries",
            "2",
            "--model",
            "gemini-1.5-pro",
        ]);
        let mut config = RulebookConfig {
            rpm: 7,
            ..Default::default()
        };
        cli.apply_overrides(&mut config);
        assert_eq!(config.output_dir, PathBuf::from("site/rules"));
        assert_eq!(config.max_retry, 2);
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.rpm, 7);
        assert!(!config.strict_fail);
    }

    #[test]
    fn missing_strict_flag_keeps_configured_strictness() {
        let cli = Cli::parse_from(["rulebook-i18n", "build"]);
        let mut config = RulebookConfig {
            strict_fail: true,
            ..Default::default()
        };
        cli.apply_overrides(&mut config);
        assert!(config.strict_fail);
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
