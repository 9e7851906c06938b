mod cli;
mod config;
mod dispatch;
mod error;
mod fingerprint;
mod frontmatter;
mod gemini;
mod git;
mod layout;
mod logging;
mod pipeline;
mod translator;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info, warn};

use cli::{Cli, Command, LogFormat};
use config::RulebookConfig;
use dispatch::Dispatcher;
use gemini::GeminiClient;
use git::GitManager;
use layout::Layout;
use logging::LogSettings;
use error::BuildError;
use pipeline::{BuildSummary, RuleBuilder};
use translator::{Glossary, Translator};
use ui::BuildProgress;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = LogSettings::resolve(cli.log_format, cli.verbose, |key| std::env::var(key).ok());
    let progress = BuildProgress::default();
    logging::init_tracing(&settings, progress.log_writer());

    match run(cli, settings.format, &progress).await {
        Ok(code) => code,
        Err(err) => {
            error!(stage = "setup", "{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, log_format: LogFormat, progress: &BuildProgress) -> Result<ExitCode> {
    let mut config = RulebookConfig::load(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let layout = Layout::new(&config.source_dir, &config.output_dir);
    match cli.command {
        Command::Build {
            clean, no_progress, ..
        } => {
            let show_progress = !no_progress && log_format == LogFormat::Text;
            build(&config, layout, clean, show_progress, log_format, progress).await
        }
        Command::Status => status(&layout),
    }
}

async fn build(
    config: &RulebookConfig,
    layout: Layout,
    clean: bool,
    show_progress: bool,
    log_format: LogFormat,
    progress: &BuildProgress,
) -> Result<ExitCode> {
    if config.api_key.trim().is_empty() {
        bail!("GEMINI_API_KEY is not set (environment or api_key in the config file)");
    }

    if clean {
        pipeline::clean_output(&layout)
            .with_context(|| format!("failed to clean {}", layout.output_root().display()))?;
    }
    let files = layout
        .discover()
        .with_context(|| format!("failed to scan {}", layout.source_root().display()))?;

    let glossary = Glossary::load(&config.glossary_path);
    let client = GeminiClient::new(config.api_key.clone(), config.model.clone())?;
    info!(
        stage = "start",
        model = client.model(),
        rpm = config.rpm,
        max_retry = config.max_retry,
        glossary_terms = glossary.len(),
        "translating with {} (rpm={}, max_retry={})",
        client.model(),
        config.rpm,
        config.max_retry
    );

    let git = match GitManager::discover(layout.source_root()) {
        Ok(git) => Some(git),
        Err(err) => {
            warn!(stage = "git", error = %err, "no git repository; provenance will read `unknown`");
            None
        }
    };

    let translator = Translator::new(Dispatcher::new(client, config.dispatch_config()), glossary);
    let mut builder = RuleBuilder::new(layout, translator, git, config.strict_fail);

    progress.start(files.len(), show_progress);
    let result = builder.build(&files, |doc| progress.advance(doc)).await;
    progress.finish();
    match log_format {
        LogFormat::Text => ui::print_summary(builder.summary()),
        LogFormat::Json => ui::print_summary_json(builder.summary()),
    }

    Ok(ExitCode::from(exit_status(&result)))
}

/// Non-zero only when a strict run aborted; failures in a lenient run are
/// reported but do not fail the process.
fn exit_status(result: &Result<BuildSummary, BuildError>) -> u8 {
    match result {
        Ok(summary) => {
            if summary.has_failures() {
                warn!(stage = "summary", errors = summary.errors, "finished with failures (non-strict)");
            }
            0
        }
        Err(err) => {
            error!(stage = "error", "{err}");
            1
        }
    }
}

fn status(layout: &Layout) -> Result<ExitCode> {
    let files = layout
        .discover()
        .with_context(|| format!("failed to scan {}", layout.source_root().display()))?;
    let reports = pipeline::plan(layout, &files)?;
    ui::print_status(&reports);
    Ok(ExitCode::SUCCESS)
}
