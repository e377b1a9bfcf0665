//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment: programmatic defaults, YAML
//! files under .warden/, then WARDEN_* environment overrides, validated
//! after extraction.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
