//! Build configuration loaded from `rulebook.toml`.
//!
//! [`RulebookConfig`] holds every tunable of a build. Values missing from the
//! file use defaults; environment variables override the file, and CLI flags
//! override both (see [`crate::cli::Cli::apply_overrides`]).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::{DispatchConfig, RetryPolicy};

/// Upper bound for `max_backoff_secs` (and so for `base_backoff_secs`).
const MAX_BACKOFF_CEILING_SECS: f64 = 3600.0;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rulebook.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct RulebookConfig {
    /// Gemini API key. Only required when a translation call is made.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum translation calls in any trailing 60 s window.
    #[serde(default = "default_rpm")]
    pub rpm: u32,

    /// Attempts per call, including the first.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: f64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: f64,

    /// Abort the run on the first failed document.
    #[serde(default)]
    pub strict_fail: bool,

    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_glossary_path")]
    pub glossary_path: PathBuf,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

// Free tier allows 15; stay below it.
fn default_rpm() -> u32 {
    12
}

fn default_max_retry() -> u32 {
    5
}

fn default_base_backoff_secs() -> f64 {
    1.5
}

fn default_max_backoff_secs() -> f64 {
    30.0
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("cursor-rules")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("web/cursor-rules")
}

fn default_glossary_path() -> PathBuf {
    PathBuf::from("cursor-rules/glossary.kr-en.json")
}

impl Default for RulebookConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            rpm: default_rpm(),
            max_retry: default_max_retry(),
            base_backoff_secs: default_base_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            strict_fail: false,
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            glossary_path: default_glossary_path(),
        }
    }
}

impl RulebookConfig {
    /// Reads `path` (defaults if it does not exist), then applies the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<RulebookConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Applies `GEMINI_*` and `STRICT_FAIL` overrides. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.model = model;
        }
        if let Some(rpm) = get("GEMINI_RPM") {
            self.rpm = rpm
                .trim()
                .parse()
                .with_context(|| format!("GEMINI_RPM is not a number: {rpm:?}"))?;
        }
        if let Some(max) = get("GEMINI_MAX_RETRY") {
            self.max_retry = max
                .trim()
                .parse()
                .with_context(|| format!("GEMINI_MAX_RETRY is not a number: {max:?}"))?;
        }
        if let Some(strict) = get("STRICT_FAIL") {
            self.strict_fail = strict.trim() == "1";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpm == 0 {
            bail!("rpm must be at least 1");
        }
        if self.max_retry == 0 {
            bail!("max_retry must be at least 1");
        }
        if !(self.base_backoff_secs.is_finite() && self.base_backoff_secs > 0.0) {
            bail!("base_backoff_secs must be a positive number");
        }
        if !self.max_backoff_secs.is_finite() || self.max_backoff_secs < self.base_backoff_secs {
            bail!("max_backoff_secs must be at least base_backoff_secs");
        }
        if self.max_backoff_secs > MAX_BACKOFF_CEILING_SECS {
            bail!("max_backoff_secs must not exceed {MAX_BACKOFF_CEILING_SECS}");
        }
        Ok(())
    }

    /// Dispatcher settings. Call after [`validate`](Self::validate).
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            rpm: self.rpm,
            retry: RetryPolicy {
                max_attempts: self.max_retry,
                base_backoff: Duration::from_secs_f64(self.base_backoff_secs),
                max_backoff: Duration::from_secs_f64(self.max_backoff_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_values() {
        let config = RulebookConfig::default();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.rpm, 12);
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.base_backoff_secs, 1.5);
        assert_eq!(config.max_backoff_secs, 30.0);
        assert!(!config.strict_fail);
        assert!(config.api_key.is_empty());
        assert_eq!(config.output_dir, PathBuf::from("web/cursor-rules"));
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            rpm = 4
            source_dir = "docs/rules"
            strict_fail = true
        "#;
        let config: RulebookConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rpm, 4);
        assert_eq!(config.source_dir, PathBuf::from("docs/rules"));
        assert!(config.strict_fail);
        assert_eq!(config.max_retry, 5);
        assert_eq!(config.model, "gemini-2.0-flash");
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = RulebookConfig {
            rpm: 4,
            ..Default::default()
        };
        config
            .apply_env(env(&[
                ("GEMINI_API_KEY", "k-123"),
                ("GEMINI_RPM", " 9 "),
                ("GEMINI_MAX_RETRY", "3"),
                ("GEMINI_MODEL", ""),
                ("STRICT_FAIL", "1"),
            ]))
            .unwrap();
        assert_eq!(config.api_key, "k-123");
        assert_eq!(config.rpm, 9);
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.model, "gemini-2.0-flash");
        assert!(config.strict_fail);
    }

    #[test]
    fn strict_fail_only_for_one() {
        let mut config = RulebookConfig {
            strict_fail: true,
            ..Default::default()
        };
        config.apply_env(env(&[("STRICT_FAIL", "0")])).unwrap();
        assert!(!config.strict_fail);
    }

    #[test]
    fn bad_numeric_env_is_an_error() {
        let mut config = RulebookConfig::default();
        let err = config.apply_env(env(&[("GEMINI_RPM", "fast")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_RPM"));
    }

    #[test]
    fn validation_rejects_degenerate_limits() {
        let zero_rpm = RulebookConfig {
            rpm: 0,
            ..Default::default()
        };
        assert!(zero_rpm.validate().is_err());

        let zero_retry = RulebookConfig {
            max_retry: 0,
            ..Default::default()
        };
        assert!(zero_retry.validate().is_err());

        let inverted = RulebookConfig {
            base_backoff_secs: 10.0,
            max_backoff_secs: 5.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn validation_rejects_backoff_beyond_duration_range() {
        let config: RulebookConfig =
            toml::from_str("base_backoff_secs = 1e300\nmax_backoff_secs = 1e300").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_backoff_secs"));

        let at_ceiling = RulebookConfig {
            base_backoff_secs: 1.5,
            max_backoff_secs: 3600.0,
            ..Default::default()
        };
        at_ceiling.validate().unwrap();
        assert_eq!(at_ceiling.dispatch_config().retry.max_backoff, Duration::from_secs(3600));
    }

    #[test]
    fn dispatch_config_maps_fields() {
        let config = RulebookConfig {
            rpm: 2,
            max_retry: 3,
            ..Default::default()
        };
        let dc = config.dispatch_config();
        assert_eq!(dc.rpm, 2);
        assert_eq!(dc.retry.max_attempts, 3);
        assert_eq!(dc.retry.base_backoff, Duration::from_millis(1500));
        assert_eq!(dc.retry.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = RulebookConfig::load(Path::new("/definitely/not/here/rulebook.toml")).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("cursor-rules"));
    }
}
