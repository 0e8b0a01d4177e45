//! Error types for the session cache and the remote gateway boundary.

use thiserror::Error;

use crate::model::{FieldGroup, SessionId};

/// Failure reported by a [`RemoteGateway`](crate::service::RemoteGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request was malformed or the source is not usable.
    #[error("{message}")]
    Invalid {
        /// Detail surfaced to the user verbatim.
        message: String,
    },
    /// The torrent is already tracked.
    #[error("{message}")]
    Duplicate {
        /// Detail surfaced to the user verbatim.
        message: String,
    },
    /// The authority did not answer within its bounded wait.
    #[error("timed out waiting for the torrent service")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The authority could not be reached or answered with a server fault.
    #[error("torrent service unavailable")]
    Unavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Transport or server detail.
        detail: String,
    },
    /// The addressed session is unknown to the authority.
    #[error("torrent not found")]
    NotFound {
        /// Identifier that was addressed.
        id: String,
    },
    /// The authority refused the request.
    #[error("{message}")]
    ServerRejected {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status returned by the authority.
        status: u16,
        /// Detail surfaced to the user verbatim.
        message: String,
    },
    /// Any other failure the gateway could not categorise.
    #[error("unexpected torrent service failure")]
    Unexpected {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying detail.
        detail: String,
    },
}

impl GatewayError {
    /// Construct an [`GatewayError::Invalid`] from a message.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Construct a [`GatewayError::Duplicate`] from a message.
    #[must_use]
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate {
            message: message.into(),
        }
    }

    /// Construct a [`GatewayError::Unavailable`] for `operation`.
    #[must_use]
    pub fn unavailable(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            detail: detail.into(),
        }
    }
}

/// Convenience alias for gateway results.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure raised by the session store itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another optimistic mutation already claims the same field group.
    #[error("another change to this torrent is still in flight")]
    Conflict {
        /// Session the mutation targeted.
        id: SessionId,
        /// Field group already claimed.
        group: FieldGroup,
    },
    /// No session with the given identifier is tracked.
    #[error("torrent is not tracked")]
    UnknownSession {
        /// Requested identifier.
        id: SessionId,
    },
    /// The session has not been confirmed by the authority yet.
    #[error("torrent is still being added")]
    ProvisionalSession {
        /// Provisional identifier.
        id: SessionId,
    },
    /// The store has been closed and no longer accepts changes.
    #[error("session store is closed")]
    Closed,
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
