//! Failure taxonomy for gateway errors.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Category of a gateway failure as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected as malformed.
    Validation,
    /// Torrent already tracked.
    Duplicate,
    /// Authority did not answer in time.
    Timeout,
    /// Authority unreachable or failing.
    Connectivity,
    /// Addressed torrent does not exist.
    NotFound,
    /// Authority refused the request.
    ServerRejected,
    /// Anything else.
    Unknown,
}

/// What the caller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDisposition {
    /// The next scheduled poll is the retry; no dedicated backoff.
    RetryOnNextPoll,
    /// Surface to the caller; retrying will not help.
    Terminal,
}

impl ErrorKind {
    /// Retry disposition for the category.
    #[must_use]
    pub const fn disposition(self) -> RetryDisposition {
        match self {
            Self::Connectivity | Self::Timeout => RetryDisposition::RetryOnNextPoll,
            Self::Validation
            | Self::Duplicate
            | Self::NotFound
            | Self::ServerRejected
            | Self::Unknown => RetryDisposition::Terminal,
        }
    }

    /// Lowercase label for logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Duplicate => "duplicate",
            Self::Timeout => "timeout",
            Self::Connectivity => "connectivity",
            Self::NotFound => "not_found",
            Self::ServerRejected => "server_rejected",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Map a gateway failure onto the taxonomy.
#[must_use]
pub const fn classify(error: &GatewayError) -> ErrorKind {
    match error {
        GatewayError::Invalid { .. } => ErrorKind::Validation,
        GatewayError::Duplicate { .. } => ErrorKind::Duplicate,
        GatewayError::Timeout { .. } => ErrorKind::Timeout,
        GatewayError::Unavailable { .. } => ErrorKind::Connectivity,
        GatewayError::NotFound { .. } => ErrorKind::NotFound,
        GatewayError::ServerRejected { .. } => ErrorKind::ServerRejected,
        GatewayError::Unexpected { .. } => ErrorKind::Unknown,
    }
}
