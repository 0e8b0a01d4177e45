//! Typed configuration models.

use std::str::FromStr;
use std::time::Duration;

use seedline_core::{Cadence, PruneRule};
use seedline_gateway::{DEFAULT_API_URL, GatewayOptions};
use serde::{Deserialize, Serialize};

use crate::defaults::{
    ADD_TIMEOUT_SECS, FAST_POLL_MS, PRUNE_AFTER_MISSES, REQUEST_TIMEOUT_SECS, SLOW_POLL_MS,
};
use crate::error::{ConfigError, ConfigResult};
use crate::validate::parse_base_url;

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Backend connection settings.
    pub api: ApiConfig,
    /// Poll cadence and pruning.
    pub polling: PollingConfig,
    /// Log output.
    pub logging: LogSettings,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the torrent backend API.
    pub base_url: String,
    /// Timeout for list and control requests, in seconds.
    pub request_timeout_secs: u64,
    /// Bounded wait for add requests, in seconds.
    pub add_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            add_timeout_secs: ADD_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    /// Timeout for list and control requests.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bounded wait for add requests.
    #[must_use]
    pub const fn add_timeout(&self) -> Duration {
        Duration::from_secs(self.add_timeout_secs)
    }

    /// Gateway options derived from this section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when the base URL is not an http(s) URL.
    pub fn gateway_options(&self) -> ConfigResult<GatewayOptions> {
        let mut options = GatewayOptions::new(parse_base_url(&self.base_url)?);
        options.request_timeout = self.request_timeout();
        options.add_timeout = self.add_timeout();
        Ok(options)
    }
}

/// Poll cadence and pruning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollingConfig {
    /// Interval while any session is transferring, in milliseconds.
    pub fast_interval_ms: u64,
    /// Interval while every session is idle, in milliseconds.
    pub slow_interval_ms: u64,
    /// Consecutive polls a session may be missing before it is dropped.
    pub prune_after_misses: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: FAST_POLL_MS,
            slow_interval_ms: SLOW_POLL_MS,
            prune_after_misses: PRUNE_AFTER_MISSES,
        }
    }
}

impl PollingConfig {
    /// Cadence used by the poll loop.
    #[must_use]
    pub const fn cadence(&self) -> Cadence {
        Cadence::new(
            Duration::from_millis(self.fast_interval_ms),
            Duration::from_millis(self.slow_interval_ms),
        )
    }

    /// Absence rule applied on merge.
    #[must_use]
    pub const fn prune_rule(&self) -> PruneRule {
        PruneRule::new(self.prune_after_misses)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// Level or filter directive.
    pub level: String,
    /// Output format.
    pub format: LogOutput,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogOutput::Auto,
        }
    }
}

/// Requested log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Pick based on the build profile.
    #[default]
    Auto,
    /// Structured JSON lines.
    Json,
    /// Human-readable lines.
    Pretty,
}

impl LogOutput {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl FromStr for LogOutput {
    type Err = ConfigError;

    fn from_str(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(ConfigError::invalid(
                "logging",
                "format",
                Some(value),
                "expected auto, json or pretty",
            )),
        }
    }
}
