use std::io::Write;
use std::time::Duration;

use seedline_config::{CONFIG_PATH_ENV, ConfigError, ConfigLoader, LogOutput};
use serial_test::serial;
use tempfile::NamedTempFile;

fn config_file(body: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(body.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn file_layer_sits_between_defaults_and_environment() -> anyhow::Result<()> {
    let file = config_file(
        r#"{
            "api": {"base_url": "http://seedbox.lan:8000/api", "add_timeout_secs": 90},
            "polling": {"fast_interval_ms": 750, "slow_interval_ms": 4000}
        }"#,
    )?;
    let config = ConfigLoader::new()
        .with_file(file.path())
        .with_var("SEEDLINE_SLOW_POLL_MS", "8000")
        .load()?;

    assert_eq!(config.api.base_url, "http://seedbox.lan:8000/api");
    assert_eq!(config.api.add_timeout(), Duration::from_secs(90));
    assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
    assert_eq!(
        config.polling.cadence().fast,
        Duration::from_millis(750)
    );
    assert_eq!(
        config.polling.cadence().slow,
        Duration::from_millis(8_000)
    );
    Ok(())
}

#[test]
fn malformed_file_is_a_parse_error() -> anyhow::Result<()> {
    let file = config_file("{ not json")?;
    let result = ConfigLoader::new().with_file(file.path()).load();
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
    Ok(())
}

#[test]
#[serial]
fn process_environment_selects_file_and_overrides() -> anyhow::Result<()> {
    let file = config_file(r#"{"logging": {"level": "debug"}}"#)?;
    // SAFETY: guarded by `#[serial]`; no other test reads these variables concurrently.
    unsafe {
        std::env::set_var(CONFIG_PATH_ENV, file.path());
        std::env::set_var("SEEDLINE_LOG_FORMAT", "pretty");
    }
    let loader = ConfigLoader::from_env();
    let loaded = loader.load();
    unsafe {
        std::env::remove_var(CONFIG_PATH_ENV);
        std::env::remove_var("SEEDLINE_LOG_FORMAT");
    }

    let config = loaded?;
    assert_eq!(loader.file(), Some(file.path()));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogOutput::Pretty);
    Ok(())
}
