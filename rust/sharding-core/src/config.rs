// rust/sharding-core/src/config.rs

//! Configuration for the sharding pass.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ShardingError};

/// Top-level pass configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    pub partition: PartitionConfig,
    pub logging: LoggingConfig,
    pub report: ReportConfig,
}

// Partitioning options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    // Number of logical cores each replica of a launch is spread over.
    pub num_cores_per_replica: usize,
}

// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive passed to the subscriber, e.g. "info" or "sharding_core=debug".
    pub level: String,
}

/// Output format of a partition report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable summary followed by the rewritten graph.
    #[default]
    Text,
    /// Machine-readable TOML document.
    Toml,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            num_cores_per_replica: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FromStr for ShardingConfig {
    type Err = ShardingError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ShardingError::config_with_source("failed to parse TOML config", e))
    }
}

impl ShardingConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShardingError::config_with_source(
                format!("failed to read config file {}", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `SHARDING_`:
    // - `SHARDING_NUM_CORES_PER_REPLICA` overrides `partition.num_cores_per_replica`
    // - `SHARDING_LOG_LEVEL` overrides `logging.level`
    // - `SHARDING_REPORT_FORMAT` overrides `report.format` ("text" or "toml")
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("SHARDING_NUM_CORES_PER_REPLICA") {
            if let Ok(n) = val.parse() {
                self.partition.num_cores_per_replica = n;
            }
        }
        if let Ok(val) = std::env::var("SHARDING_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SHARDING_REPORT_FORMAT") {
            match val.to_lowercase().as_str() {
                "text" => self.report.format = ReportFormat::Text,
                "toml" => self.report.format = ReportFormat::Toml,
                _ => {} // ignore invalid values
            }
        }
        self
    }

    // Validate configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.partition.num_cores_per_replica == 0 {
            return Err(ShardingError::config(
                "partition.num_cores_per_replica must be greater than 0",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ShardingError::config("logging.level must not be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ShardingConfig::default();

        assert_eq!(config.partition.num_cores_per_replica, 1);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.report.format, ReportFormat::Text);
    }

    #[test]
    fn test_default_validates() {
        assert!(ShardingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_str_empty() {
        let config: ShardingConfig = "".parse().unwrap();
        assert_eq!(config, ShardingConfig::default());
    }

    #[test]
    fn test_from_str_full() {
        let config: ShardingConfig = r#"
            [partition]
            num_cores_per_replica = 8

            [logging]
            level = "sharding_core=debug"

            [report]
            format = "toml"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.partition.num_cores_per_replica, 8);
        assert_eq!(config.logging.level, "sharding_core=debug");
        assert_eq!(config.report.format, ReportFormat::Toml);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: std::result::Result<ShardingConfig, _> = "invalid = [".parse();
        assert!(matches!(result, Err(ShardingError::Config { .. })));
    }

    #[test]
    fn test_from_str_unknown_format() {
        let result: std::result::Result<ShardingConfig, _> = "[report]\nformat = \"yaml\"".parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [partition]
            num_cores_per_replica = 4
            "#
        )
        .unwrap();

        let config = ShardingConfig::from_file(file.path()).unwrap();
        assert_eq!(config.partition.num_cores_per_replica, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file_not_found() {
        let result = ShardingConfig::from_file("/nonexistent/sharding.toml");
        assert!(matches!(result, Err(ShardingError::Config { .. })));
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[partition]\nnum_cores_per_replica = 0").unwrap();

        let result = ShardingConfig::from_file(file.path());
        assert!(matches!(result, Err(ShardingError::Config { .. })));
    }

    #[test]
    fn test_validate_empty_log_level() {
        let mut config = ShardingConfig::default();
        config.logging.level = "  ".to_string();
        assert!(config.validate().is_err());
    }

    // All env var cases live in one test since the process environment is shared.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("SHARDING_NUM_CORES_PER_REPLICA", "2");
        std::env::set_var("SHARDING_LOG_LEVEL", "debug");
        std::env::set_var("SHARDING_REPORT_FORMAT", "TOML");

        let config = ShardingConfig::default().with_env_overrides();
        assert_eq!(config.partition.num_cores_per_replica, 2);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.report.format, ReportFormat::Toml);

        std::env::set_var("SHARDING_NUM_CORES_PER_REPLICA", "not-a-number");
        std::env::set_var("SHARDING_REPORT_FORMAT", "yaml");

        let config = ShardingConfig::default().with_env_overrides();
        assert_eq!(config.partition.num_cores_per_replica, 1);
        assert_eq!(config.report.format, ReportFormat::Text);

        std::env::remove_var("SHARDING_NUM_CORES_PER_REPLICA");
        std::env::remove_var("SHARDING_LOG_LEVEL");
        std::env::remove_var("SHARDING_REPORT_FORMAT");
    }
}
