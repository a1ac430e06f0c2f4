//! Ingestion policy configuration from config.toml
//!
//! This module loads the tunables of the ingestion pipeline and type matcher
//! from a TOML configuration file. Every knob has a default, and a missing
//! config file is not an error - the defaults are the documented behavior.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    /// The `[ingestion]` table
    #[serde(default)]
    ingestion: IngestionConfig,
}

/// Tunables for the ingestion pipeline and type inference
#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Attempt ceiling: a pending receipt that has already been attempted
    /// this many times moves to `permanently-failed` instead of retrying
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Pending receipts stuck in `processing` longer than this are treated
    /// as crashed mid-extraction and may be reset to a retryable `failed`
    #[serde(default = "default_processing_timeout_minutes")]
    pub processing_timeout_minutes: i64,
    /// Minimum token-overlap ratio for reusing an existing type label
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

const fn default_max_attempts() -> i32 {
    5
}

const fn default_processing_timeout_minutes() -> i64 {
    10
}

const fn default_similarity_threshold() -> f64 {
    0.6
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            processing_timeout_minutes: default_processing_timeout_minutes(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Loads ingestion configuration from a TOML file.
///
/// A missing file yields the defaults; an unreadable or syntactically
/// invalid file is an error.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IngestionConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(IngestionConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let parsed: ConfigFile = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    Ok(parsed.ingestion)
}

/// Loads ingestion configuration from the default location (./config.toml)
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_default_config() -> Result<IngestionConfig> {
    load_config("config.toml")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestionConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.processing_timeout_minutes, 10);
        assert_eq!(config.similarity_threshold, 0.6);
    }

    #[test]
    fn test_parse_ingestion_config() {
        let toml_str = r#"
            [ingestion]
            max_attempts = 3
            processing_timeout_minutes = 30
            similarity_threshold = 0.75
        "#;

        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.ingestion.max_attempts, 3);
        assert_eq!(parsed.ingestion.processing_timeout_minutes, 30);
        assert_eq!(parsed.ingestion.similarity_threshold, 0.75);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let toml_str = r"
            [ingestion]
            max_attempts = 2
        ";

        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(parsed.ingestion.max_attempts, 2);
        assert_eq!(parsed.ingestion.processing_timeout_minutes, 10);
        assert_eq!(parsed.ingestion.similarity_threshold, 0.6);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("does-not-exist.toml").unwrap();
        assert_eq!(config.max_attempts, 5);
    }
}
