use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::note::legacy::{AmbiguityPolicy, CONTEXT_LINES};
use crate::suggestion::DEFAULT_COMMIT_MESSAGE;

const CONFIG_FILE: &str = ".diff-notes.toml";
const TIMEOUT_ENV: &str = "DIFF_NOTES_MIGRATION_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

/// Top-level configuration loaded from .diff-notes.toml.
///
/// Every section is optional; an empty file and no file are the same.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub legacy: LegacyConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    /// Which occurrence wins when a legacy line appears more than once
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,

    /// Upper bound on lines shown around a legacy note, the note's line included
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::default(),
            context_lines: CONTEXT_LINES,
        }
    }
}

fn default_context_lines() -> usize {
    CONTEXT_LINES
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Budget for repositioning a batch of notes, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl MigrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionConfig {
    /// Template for commit messages; supports %{branch_name}, %{username},
    /// %{files_count}, %{suggestions_count} and %{file_paths}
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            commit_message: default_commit_message(),
        }
    }
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.to_string()
}

impl Config {
    /// Load configuration from .diff-notes.toml in the current directory.
    /// Returns the defaults if the file doesn't exist.
    ///
    /// `DIFF_NOTES_MIGRATION_TIMEOUT_MS` overrides `migration.timeout_ms`.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if let Ok(value) = std::env::var(TIMEOUT_ENV) {
            config.apply_timeout_override(&value)?;
        }

        Ok(config)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_timeout_override(&mut self, value: &str) -> Result<(), ConfigError> {
        self.migration.timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: TIMEOUT_ENV.to_string(),
            value: value.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.legacy.ambiguity, AmbiguityPolicy::ClosestToRecorded);
        assert_eq!(config.legacy.context_lines, 16);
        assert_eq!(config.migration.timeout(), Duration::from_secs(5));
        assert_eq!(config.suggestions.commit_message, DEFAULT_COMMIT_MESSAGE);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.legacy.context_lines, 16);
        assert_eq!(config.migration.timeout_ms, 5_000);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[legacy]
ambiguity = "reject"

[migration]
timeout_ms = 250

[suggestions]
commit_message = "%{username}: apply to %{file_paths}"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.legacy.ambiguity, AmbiguityPolicy::Reject);
        assert_eq!(config.legacy.context_lines, 16);
        assert_eq!(config.migration.timeout(), Duration::from_millis(250));
        assert_eq!(config.suggestions.commit_message, "%{username}: apply to %{file_paths}");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[legacy]\nambiguity = \"random\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_timeout_override() {
        let mut config = Config::default();
        config.apply_timeout_override(" 1200 ").unwrap();
        assert_eq!(config.migration.timeout_ms, 1200);
        assert!(matches!(
            config.apply_timeout_override("soon"),
            Err(ConfigError::InvalidEnv { .. })
        ));
        assert_eq!(config.migration.timeout_ms, 1200);
    }
}
