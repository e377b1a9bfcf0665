use serde::{Deserialize, Serialize};

/// Main configuration structure for warden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Execution engine configuration
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".warden/warden.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Run artifact directories are created under here
    #[serde(default = "default_runs_root")]
    pub runs_root: String,

    /// Repository lock files live here
    #[serde(default = "default_locks_dir")]
    pub locks_dir: String,

    /// Mode assumed when a request names none
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Entering Done below this audit-row count warns but proceeds
    #[serde(default = "default_min_audit_events")]
    pub min_audit_events_for_done: i64,

    /// Bounded wait for the serialized task-record writer, milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_runs_root() -> String {
    ".warden/runs".to_string()
}

fn default_locks_dir() -> String {
    ".warden/locks".to_string()
}

fn default_mode() -> String {
    "implementation".to_string()
}

const fn default_min_audit_events() -> i64 {
    3
}

const fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            runs_root: default_runs_root(),
            locks_dir: default_locks_dir(),
            default_mode: default_mode(),
            min_audit_events_for_done: default_min_audit_events(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}
