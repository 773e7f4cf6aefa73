//! Configuration module for Sumi-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Concurrency limit: {}", config.network.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AssetConfig, Config, MarkerConfig, NetworkConfig, OutputConfig, OutputMode, SessionConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
