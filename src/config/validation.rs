use crate::config::types::{
    AssetConfig, Config, MarkerConfig, NetworkConfig, OutputConfig, SessionConfig,
};
use crate::ConfigError;
use url::Url;

/// Most IDs one session may cover
const MAX_RANGE_IDS: u64 = 10_000_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_session_config(&config.session)?;
    validate_network_config(&config.network)?;
    validate_output_config(&config.output)?;
    if config.downloads_assets() {
        validate_asset_config(&config.assets)?;
    }
    validate_markers(&config.markers)?;
    Ok(())
}

/// Validates the session range and ID format
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.start_id > config.end_id {
        return Err(ConfigError::Validation(format!(
            "start-id must be <= end-id, got {}-{}",
            config.start_id, config.end_id
        )));
    }

    if config.end_id - config.start_id >= MAX_RANGE_IDS {
        return Err(ConfigError::Validation(format!(
            "ID range {}-{} covers more than {} IDs; split it into several sessions",
            config.start_id, config.end_id, MAX_RANGE_IDS
        )));
    }

    if config.id_width < 1 || config.id_width > 20 {
        return Err(ConfigError::Validation(format!(
            "id-width must be between 1 and 20, got {}",
            config.id_width
        )));
    }

    Ok(())
}

/// Validates throttling and retry settings
fn validate_network_config(config: &NetworkConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    for (name, value) in [
        ("min-delay", config.min_delay),
        ("max-delay", config.max_delay),
        ("short-retry-delay", config.short_retry_delay),
        ("ban-cooldown", config.ban_cooldown),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    if config.min_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "min-delay ({}) must not exceed max-delay ({})",
            config.min_delay, config.max_delay
        )));
    }

    for (name, value) in [
        ("request-timeout", config.request_timeout),
        ("final-attempt-timeout", config.final_attempt_timeout),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
    }

    if config.user_agents.iter().all(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents must contain at least one non-empty entry".to_string(),
        ));
    }

    Ok(())
}

/// Validates output paths
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, path) in [
        ("metadata-path", &config.metadata_path),
        ("titles-path", &config.titles_path),
        ("forbidden-path", &config.forbidden_path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates the asset budget
fn validate_asset_config(config: &AssetConfig) -> Result<(), ConfigError> {
    if !config.max_storage_gb.is_finite() || config.max_storage_gb <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "max-storage-gb must be positive, got {}",
            config.max_storage_gb
        )));
    }

    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "asset directory cannot be empty".to_string(),
        ));
    }

    if !config.timeout.is_finite() || config.timeout <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "asset timeout must be positive, got {}",
            config.timeout
        )));
    }

    Ok(())
}

/// A classifier with no boundary marker would never stop enumerating
fn validate_markers(config: &MarkerConfig) -> Result<(), ConfigError> {
    if config.boundary.iter().all(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "markers.boundary must contain at least one non-empty marker".to_string(),
        ));
    }

    if scraper::Selector::parse(&config.alert_selector).is_err() {
        return Err(ConfigError::Validation(format!(
            "markers.alert-selector is not a valid CSS selector: {}",
            config.alert_selector
        )));
    }

    Ok(())
}
