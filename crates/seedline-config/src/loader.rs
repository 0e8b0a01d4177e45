//! Layered configuration loading.
//!
//! # Design
//! - Layers apply in a fixed order: built-in defaults, an optional JSON file,
//!   then `SEEDLINE_*` environment variables.
//! - The merged result is validated once, after every layer applied.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::defaults::CONFIG_PATH_ENV;
use crate::error::{ConfigError, ConfigResult};
use crate::model::SyncConfig;
use crate::validate::{parse_u32, parse_u64, validate};

const ENV_PREFIX: &str = "SEEDLINE_";

/// Builder that layers configuration sources.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl ConfigLoader {
    /// Loader with no file and no environment overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader seeded from the process environment.
    ///
    /// Every `SEEDLINE_*` variable is captured; `SEEDLINE_CONFIG` names the file layer.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Loader seeded from explicit variables, filtered like [`ConfigLoader::from_env`].
    #[must_use]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        let file = env
            .get(CONFIG_PATH_ENV)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self { file, env }
    }

    /// Use `path` as the file layer, replacing any path taken from the environment.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add or replace one environment override.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// File layer, when one is configured.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Apply every layer and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] when the file
    /// layer cannot be loaded, and [`ConfigError::InvalidField`] for bad
    /// overrides or a configuration failing validation.
    pub fn load(&self) -> ConfigResult<SyncConfig> {
        let mut config = match &self.file {
            Some(path) => read_file(path)?,
            None => SyncConfig::default(),
        };
        for (key, value) in &self.env {
            apply_override(&mut config, key, value)?;
        }
        validate(&config)?;
        debug!(
            file = ?self.file,
            overrides = self.env.len(),
            base_url = %config.api.base_url,
            "configuration loaded"
        );
        Ok(config)
    }
}

fn read_file(path: &Path) -> ConfigResult<SyncConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_override(config: &mut SyncConfig, key: &str, value: &str) -> ConfigResult<()> {
    match key {
        "SEEDLINE_API_URL" => config.api.base_url = value.trim().to_string(),
        "SEEDLINE_HTTP_TIMEOUT_SECS" => {
            config.api.request_timeout_secs = parse_u64("api", "request_timeout_secs", value)?;
        }
        "SEEDLINE_ADD_TIMEOUT_SECS" => {
            config.api.add_timeout_secs = parse_u64("api", "add_timeout_secs", value)?;
        }
        "SEEDLINE_FAST_POLL_MS" => {
            config.polling.fast_interval_ms = parse_u64("polling", "fast_interval_ms", value)?;
        }
        "SEEDLINE_SLOW_POLL_MS" => {
            config.polling.slow_interval_ms = parse_u64("polling", "slow_interval_ms", value)?;
        }
        "SEEDLINE_PRUNE_AFTER" => {
            config.polling.prune_after_misses =
                parse_u32("polling", "prune_after_misses", value)?;
        }
        "SEEDLINE_LOG_LEVEL" => config.logging.level = value.trim().to_string(),
        "SEEDLINE_LOG_FORMAT" => config.logging.format = value.parse()?,
        CONFIG_PATH_ENV => {}
        other => debug!(variable = other, "ignoring unrecognised environment variable"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogOutput;

    #[test]
    fn defaults_apply_without_layers() -> anyhow::Result<()> {
        assert_eq!(ConfigLoader::new().load()?, SyncConfig::default());
        Ok(())
    }

    #[test]
    fn environment_overrides_take_effect() -> anyhow::Result<()> {
        let config = ConfigLoader::from_vars([
            ("SEEDLINE_API_URL", "http://seedbox:9000/api"),
            ("SEEDLINE_FAST_POLL_MS", "500"),
            ("SEEDLINE_PRUNE_AFTER", "4"),
            ("SEEDLINE_LOG_FORMAT", "json"),
            ("PATH", "/usr/bin"),
        ])
        .load()?;
        assert_eq!(config.api.base_url, "http://seedbox:9000/api");
        assert_eq!(config.polling.fast_interval_ms, 500);
        assert_eq!(config.polling.prune_after_misses, 4);
        assert_eq!(config.logging.format, LogOutput::Json);
        Ok(())
    }

    #[test]
    fn malformed_override_names_the_field() {
        let result = ConfigLoader::new()
            .with_var("SEEDLINE_SLOW_POLL_MS", "soon")
            .load();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                field: "slow_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn overrides_are_validated_after_layering() {
        let result = ConfigLoader::new()
            .with_var("SEEDLINE_FAST_POLL_MS", "9000")
            .load();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                field: "fast_interval_ms",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let result = ConfigLoader::new()
            .with_file("/nonexistent/seedline.json")
            .load();
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
