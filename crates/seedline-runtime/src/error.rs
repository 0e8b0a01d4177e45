//! Errors returned by engine control calls.

use seedline_core::{ErrorKind, GatewayError, StoreError, classify};
use thiserror::Error;

/// Failure of a control command issued through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The gateway, or local validation standing in for it, rejected the command.
    #[error("{source}")]
    Gateway {
        /// Classified failure category.
        kind: ErrorKind,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },
    /// The session store refused the optimistic mutation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The engine shut down before the command completed.
    #[error("engine is shutting down")]
    Cancelled {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl ControlError {
    /// Classified category when the failure came from the gateway.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Gateway { kind, .. } => Some(*kind),
            Self::Store(_) | Self::Cancelled { .. } => None,
        }
    }

    /// Whether the failure was caused by a concurrent mutation of the same session.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict { .. }))
    }
}

impl From<GatewayError> for ControlError {
    fn from(source: GatewayError) -> Self {
        Self::Gateway {
            kind: classify(&source),
            source,
        }
    }
}

/// Convenience alias for control results.
pub type ControlResult<T> = Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_carry_their_classification() {
        let error = ControlError::from(GatewayError::NotFound { id: "t1".into() });
        assert_eq!(error.kind(), Some(ErrorKind::NotFound));
        assert_eq!(error.to_string(), "torrent not found");
    }

    #[test]
    fn store_conflicts_are_detectable() {
        let error = ControlError::from(StoreError::Conflict {
            id: seedline_core::SessionId::confirmed("t1"),
            group: seedline_core::FieldGroup::Lifecycle,
        });
        assert!(error.is_conflict());
        assert_eq!(error.kind(), None);
    }
}
