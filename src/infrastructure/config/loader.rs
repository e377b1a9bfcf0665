use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Runs root cannot be empty")]
    EmptyRunsRoot,

    #[error("Locks directory cannot be empty")]
    EmptyLocksDir,

    #[error("Default mode cannot be empty")]
    EmptyDefaultMode,

    #[error("Invalid min_audit_events_for_done: {0}. Cannot be negative")]
    InvalidMinAuditEvents(i64),

    #[error("Invalid write_timeout_ms: {0}. Must be at least 1")]
    InvalidWriteTimeout(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .warden/config.yaml (project config, created by init)
    /// 3. .warden/local.yaml (project local overrides, optional)
    /// 4. Environment variables (WARDEN_* prefix, highest priority)
    ///
    /// Note: Configuration is always project-local (pwd/.warden/) so
    /// multiple governed repositories can coexist on one machine.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            // 1. Start with programmatic defaults
            .merge(Serialized::defaults(Config::default()))
            // 2. Merge project config (primary config, created by init)
            .merge(Yaml::file(".warden/config.yaml"))
            // 3. Merge project local overrides (optional, for dev/test overrides)
            .merge(Yaml::file(".warden/local.yaml"))
            // 4. Merge environment variables (highest priority)
            .merge(Env::prefixed("WARDEN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.execution.runs_root.is_empty() {
            return Err(ConfigError::EmptyRunsRoot);
        }

        if config.execution.locks_dir.is_empty() {
            return Err(ConfigError::EmptyLocksDir);
        }

        if config.execution.default_mode.is_empty() {
            return Err(ConfigError::EmptyDefaultMode);
        }

        if config.execution.min_audit_events_for_done < 0 {
            return Err(ConfigError::InvalidMinAuditEvents(
                config.execution.min_audit_events_for_done,
            ));
        }

        if config.execution.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidWriteTimeout(
                config.execution.write_timeout_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".warden/warden.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.execution.runs_root, ".warden/runs");
        assert_eq!(config.execution.default_mode, "implementation");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: pretty
  retention_days: 7
execution:
  runs_root: /var/warden/runs
  default_mode: review
  min_audit_events_for_done: 5
  write_timeout_ms: 250
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.retention_days, 7);
        assert_eq!(config.execution.runs_root, "/var/warden/runs");
        assert_eq!(config.execution.default_mode, "review");
        assert_eq!(config.execution.min_audit_events_for_done, 5);
        assert_eq!(config.execution.write_timeout_ms, 250);
        // Unlisted fields keep their defaults
        assert_eq!(config.execution.locks_dir, ".warden/locks");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyDatabasePath));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidMaxConnections(0)
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            other => panic!("Expected InvalidLogFormat error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_runs_root() {
        let mut config = Config::default();
        config.execution.runs_root = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyRunsRoot));
    }

    #[test]
    fn test_validate_empty_default_mode() {
        let mut config = Config::default();
        config.execution.default_mode = String::new();

        let result = ConfigLoader::validate(&config);
        assert!(matches!(result.unwrap_err(), ConfigError::EmptyDefaultMode));
    }

    #[test]
    fn test_validate_negative_min_audit_events() {
        let mut config = Config::default();
        config.execution.min_audit_events_for_done = -1;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidMinAuditEvents(-1)
        ));
    }

    #[test]
    fn test_validate_zero_write_timeout() {
        let mut config = Config::default();
        config.execution.write_timeout_ms = 0;

        let result = ConfigLoader::validate(&config);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidWriteTimeout(0)
        ));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "logging:\n  level: warn\nexecution:\n  default_mode: planning"
        )
        .unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.execution.default_mode, "planning");
        assert_eq!(config.database.path, ".warden/warden.db");
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        // Create base config
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "logging:\n  level: info\n  format: json\nexecution:\n  default_mode: review"
        )
        .unwrap();
        base_file.flush().unwrap();

        // Create override config
        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "logging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(
            config.execution.default_mode, "review",
            "Base value should persist when not overridden"
        );
    }
}
