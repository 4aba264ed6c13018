mod compression;
mod llm;
mod logging;

pub use compression::*;
pub use llm::*;
pub use logging::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "EDITION_CONFIG";

/// File names searched, in order, under the project directory.
pub const CONFIG_CANDIDATES: &[&str] = &[".edition.toml", "edition.toml", "config/edition.toml"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Parse a TOML config file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Locate and load the config for a project directory.
    ///
    /// `EDITION_CONFIG` wins when set. Otherwise the first existing file in
    /// [`CONFIG_CANDIDATES`] is used. When nothing is found the defaults are
    /// returned together with the path a config would be written to.
    pub fn discover(project_dir: &Path) -> Result<(Self, PathBuf)> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(explicit);
            let config = Self::load(&path)?;
            tracing::info!(path = %path.display(), "configuration loaded from {CONFIG_ENV}");
            return Ok((config, path));
        }

        for name in CONFIG_CANDIDATES {
            let path = project_dir.join(name);
            if path.is_file() {
                let config = Self::load(&path)?;
                tracing::info!(path = %path.display(), "configuration loaded");
                return Ok((config, path));
            }
        }

        let path = project_dir.join(CONFIG_CANDIDATES[0]);
        tracing::info!(
            path = %path.display(),
            "no configuration file found, using defaults"
        );
        Ok((Self::default(), path))
    }

    /// Serialize the resolved config (defaults filled in) to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: String, message: &str| {
            errors.push(ConfigError {
                severity,
                field,
                message: message.into(),
            })
        };

        if self.llm.providers.is_empty() {
            push(
                ConfigSeverity::Warning,
                "llm.providers".into(),
                "no LLM providers configured",
            );
        }

        let mut seen = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("llm.providers[{i}].id"),
                    "provider id must not be empty",
                );
            } else if !seen.insert(provider.id.as_str()) {
                push(
                    ConfigSeverity::Error,
                    format!("llm.providers[{i}].id"),
                    "duplicate provider id",
                );
            }
            if provider.base_url.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("llm.providers[{i}].base_url"),
                    "provider base_url must not be empty",
                );
            }
        }

        if !self.llm.providers.is_empty() && !seen.contains(self.llm.active_provider.as_str()) {
            push(
                ConfigSeverity::Error,
                "llm.active_provider".into(),
                "active provider does not match any configured provider id",
            );
        }

        for (i, id) in self.llm.fallback_order.iter().enumerate() {
            if !seen.contains(id.as_str()) {
                push(
                    ConfigSeverity::Warning,
                    format!("llm.fallback_order[{i}]"),
                    "fallback entry does not match any configured provider id",
                );
            }
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            push(
                ConfigSeverity::Error,
                "llm.temperature".into(),
                "temperature must be between 0.0 and 1.0",
            );
        }

        if self.llm.default_timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "llm.default_timeout_ms".into(),
                "default_timeout_ms must be greater than 0",
            );
        }

        if self.llm.max_tokens == 0 {
            push(
                ConfigSeverity::Error,
                "llm.max_tokens".into(),
                "max_tokens must be greater than 0",
            );
        }

        if self.compression.target_token_limit == 0 {
            push(
                ConfigSeverity::Error,
                "compression.target_token_limit".into(),
                "target_token_limit must be greater than 0",
            );
        }

        if self.compression.window_size == 0 {
            push(
                ConfigSeverity::Error,
                "compression.window_size".into(),
                "window_size must be greater than 0",
            );
        }

        if self.compression.hybrid_small > self.compression.hybrid_medium {
            push(
                ConfigSeverity::Warning,
                "compression.hybrid_small".into(),
                "hybrid_small is larger than hybrid_medium; the relevance tier is never used",
            );
        }

        errors
    }
}
