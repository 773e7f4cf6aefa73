//! Sumi-Sweep: a polite sequential-ID page sweeper
//!
//! This crate enumerates a dense numeric ID space on a remote site, fetches each
//! page, classifies the outcome, persists records incrementally, and optionally
//! downloads one bounded-size asset per record, while backing off from the site's
//! abuse defenses and resuming cleanly after restarts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Record sink error: {0}")]
    Sink(#[from] storage::SinkError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use record::{PublicationStatus, Record};
pub use state::{FetchState, TaskStatus};
