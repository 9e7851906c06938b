//! Tracing subscriber setup.

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;
use crate::ui::LogWriter;

/// Log settings resolved from flags and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Default filter when `RUST_LOG` is not set.
    pub level: &'static str,
    pub color: bool,
    /// `LOG_LEVEL` value that named no known level; reported once logging is up.
    pub unknown_level: Option<String>,
}

impl LogSettings {
    /// `--log-format` wins over `LOG_JSON=1`; `-v` raises the default level;
    /// `LOG_LEVEL` replaces it.
    pub fn resolve(
        format: Option<LogFormat>,
        verbose: u8,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let json = lookup("LOG_JSON").is_some_and(|v| v.trim() == "1");
        let format = format.unwrap_or(if json { LogFormat::Json } else { LogFormat::Text });

        let by_verbosity = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut unknown_level = None;
        let level = match lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_level(&raw).unwrap_or_else(|| {
                unknown_level = Some(raw.trim().to_string());
                "info"
            }),
            None => by_verbosity,
        };

        let color = lookup("LOG_COLOR").is_some_and(|v| v.trim() == "1");
        Self {
            format,
            level,
            color,
            unknown_level,
        }
    }
}

/// Accepts tracing level names plus the `WARNING` / `CRITICAL` / `FATAL`
/// spellings used by other logging stacks.
fn parse_level(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

/// Installs the global subscriber. Log lines go through `writer`, which
/// keeps them from tearing the progress bar.
pub fn init_tracing(settings: &LogSettings, writer: LogWriter) {
    let filter = format!("rulebook_i18n={}", settings.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match settings.format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(settings.color)
                .with_writer(writer)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_current_span(true)
                .with_writer(writer)
                .init();
        }
    }

    if let Some(raw) = &settings.unknown_level {
        warn!(stage = "setup", "unknown LOG_LEVEL {raw:?}, using info");
    }
}
