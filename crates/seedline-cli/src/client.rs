//! Engine wiring and error types shared by every command.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use anyhow::anyhow;
use seedline_config::{ConfigError, SyncConfig};
use seedline_core::{ErrorKind, GatewayError, RemoteGateway, StoreError};
use seedline_gateway::HttpGateway;
use seedline_runtime::{ControlError, EngineOptions, SyncEngine};

use crate::cli::OutputFormat;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ControlError> for CliError {
    fn from(error: ControlError) -> Self {
        match &error {
            ControlError::Gateway {
                kind: ErrorKind::Validation | ErrorKind::Duplicate,
                ..
            } => Self::Validation(error.to_string()),
            ControlError::Store(StoreError::UnknownSession { id }) => {
                Self::Validation(format!("no torrent with id '{id}'"))
            }
            ControlError::Store(StoreError::ProvisionalSession { id }) => {
                Self::Validation(format!("torrent '{id}' is still being added"))
            }
            ControlError::Gateway { kind, source } => {
                Self::Failure(anyhow!("{} ({kind})", describe(source)))
            }
            ControlError::Store(_) | ControlError::Cancelled { .. } => {
                Self::Failure(anyhow!("{error}"))
            }
        }
    }
}

fn describe(error: &GatewayError) -> String {
    match error {
        GatewayError::Unavailable { detail, .. } | GatewayError::Unexpected { detail, .. } => {
            format!("{error}: {detail}")
        }
        other => other.to_string(),
    }
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        Self::Validation(format!("{:#}", anyhow::Error::new(error)))
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) engine: Arc<SyncEngine>,
    pub(crate) output: OutputFormat,
}

impl AppContext {
    /// Build the HTTP gateway and engine described by `config`.
    pub(crate) fn from_config(config: &SyncConfig, output: OutputFormat) -> CliResult<Self> {
        let gateway = HttpGateway::new(config.api.gateway_options()?).map_err(|err| {
            CliError::failure(anyhow!("failed to build HTTP client: {err}"))
        })?;
        let options = EngineOptions {
            cadence: config.polling.cadence(),
            prune: config.polling.prune_rule(),
            ..EngineOptions::default()
        };
        Ok(Self::with_gateway(Arc::new(gateway), options, output))
    }

    pub(crate) fn with_gateway(
        gateway: Arc<dyn RemoteGateway>,
        options: EngineOptions,
        output: OutputFormat,
    ) -> Self {
        Self {
            engine: Arc::new(SyncEngine::new(gateway, options)),
            output,
        }
    }
}
