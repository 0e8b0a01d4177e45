//! Validation helpers and parsing utilities for configuration values.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::SyncConfig;

/// Check cross-field constraints on a fully layered configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(config: &SyncConfig) -> ConfigResult<()> {
    parse_base_url(&config.api.base_url)?;
    require_positive("api", "request_timeout_secs", config.api.request_timeout_secs)?;
    require_positive("api", "add_timeout_secs", config.api.add_timeout_secs)?;

    let polling = &config.polling;
    require_positive("polling", "fast_interval_ms", polling.fast_interval_ms)?;
    require_positive("polling", "slow_interval_ms", polling.slow_interval_ms)?;
    if polling.fast_interval_ms > polling.slow_interval_ms {
        return Err(ConfigError::invalid(
            "polling",
            "fast_interval_ms",
            Some(&polling.fast_interval_ms.to_string()),
            "must not exceed slow_interval_ms",
        ));
    }
    if polling.prune_after_misses == 0 {
        return Err(ConfigError::invalid(
            "polling",
            "prune_after_misses",
            Some("0"),
            "must be at least 1",
        ));
    }
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "logging",
            "level",
            None,
            "must not be empty",
        ));
    }
    Ok(())
}

/// Parse the backend base URL, accepting only http(s).
pub(crate) fn parse_base_url(value: &str) -> ConfigResult<Url> {
    let url = Url::parse(value.trim()).map_err(|err| {
        ConfigError::invalid("api", "base_url", Some(value), err.to_string())
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "api",
            "base_url",
            Some(value),
            "must use http or https",
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::invalid(
            "api",
            "base_url",
            Some(value),
            "must include a host",
        ));
    }
    Ok(url)
}

pub(crate) fn parse_u64(section: &'static str, field: &'static str, value: &str) -> ConfigResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(section, field, Some(value), "must be a whole number"))
}

pub(crate) fn parse_u32(section: &'static str, field: &'static str, value: &str) -> ConfigResult<u32> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::invalid(section, field, Some(value), "must be a whole number"))
}

fn require_positive(section: &'static str, field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(
            section,
            field,
            Some("0"),
            "must be greater than zero",
        ));
    }
    Ok(())
}
