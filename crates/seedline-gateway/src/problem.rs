//! Translation of backend failures into [`GatewayError`].

use reqwest::{Response, StatusCode};
use seedline_core::GatewayError;

use crate::wire::ProblemBody;

/// Operation being performed, which decides how a status is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Add,
    List,
    Remove,
    Pause,
    Resume,
    OpenDownloads,
    DownloadsPath,
}

impl Operation {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::List => "list",
            Self::Remove => "remove",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::OpenDownloads => "open_downloads_folder",
            Self::DownloadsPath => "downloads_path",
        }
    }
}

/// Extract the `detail` the backend attached to an error response.
pub(crate) async fn read_detail(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = response.bytes().await.unwrap_or_default();
    let detail = serde_json::from_slice::<ProblemBody>(&bytes)
        .ok()
        .and_then(|body| body.detail)
        .map(|detail| match detail {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .unwrap_or_else(|| String::from_utf8_lossy(&bytes).trim().to_string());
    let detail = if detail.is_empty() {
        format!("request failed with status {status}")
    } else {
        detail
    };
    (status, detail)
}

/// Map a non-success response onto the error taxonomy for `operation`.
pub(crate) fn from_status(
    operation: Operation,
    id: Option<&str>,
    status: StatusCode,
    detail: String,
) -> GatewayError {
    let name = operation.as_str();
    match operation {
        Operation::List => GatewayError::Unavailable {
            operation: name,
            detail: format!("{detail} (status {status})"),
        },
        Operation::Add => match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                GatewayError::Timeout { operation: name }
            }
            StatusCode::CONFLICT => GatewayError::Duplicate { message: detail },
            status if status.is_server_error() => GatewayError::Unavailable {
                operation: name,
                detail,
            },
            _ => GatewayError::Invalid { message: detail },
        },
        Operation::Remove
        | Operation::Pause
        | Operation::Resume
        | Operation::OpenDownloads
        | Operation::DownloadsPath => match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => GatewayError::NotFound { id: id.to_string() },
            (
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT,
                _,
            ) => GatewayError::Unavailable {
                operation: name,
                detail,
            },
            (status, _) => GatewayError::ServerRejected {
                operation: name,
                status: status.as_u16(),
                message: detail,
            },
        },
    }
}

/// Map a transport-level failure.
pub(crate) fn from_transport(operation: Operation, error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() && operation == Operation::Add {
        return GatewayError::Timeout {
            operation: operation.as_str(),
        };
    }
    if error.is_decode() {
        return GatewayError::Unavailable {
            operation: operation.as_str(),
            detail: format!("undecodable response: {error}"),
        };
    }
    GatewayError::Unavailable {
        operation: operation.as_str(),
        detail: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_statuses() {
        let map = |status| from_status(Operation::Add, None, status, "detail".into());
        assert_eq!(map(StatusCode::BAD_REQUEST), GatewayError::invalid("detail"));
        assert_eq!(
            map(StatusCode::UNPROCESSABLE_ENTITY),
            GatewayError::invalid("detail")
        );
        assert_eq!(map(StatusCode::CONFLICT), GatewayError::duplicate("detail"));
        assert_eq!(
            map(StatusCode::REQUEST_TIMEOUT),
            GatewayError::Timeout { operation: "add" }
        );
        assert!(matches!(
            map(StatusCode::INTERNAL_SERVER_ERROR),
            GatewayError::Unavailable { .. }
        ));
    }

    #[test]
    fn mutation_statuses() {
        let not_found = from_status(
            Operation::Pause,
            Some("t1"),
            StatusCode::NOT_FOUND,
            "gone".into(),
        );
        assert_eq!(not_found, GatewayError::NotFound { id: "t1".into() });

        let rejected = from_status(
            Operation::Remove,
            Some("t1"),
            StatusCode::INTERNAL_SERVER_ERROR,
            "disk busy".into(),
        );
        assert_eq!(
            rejected,
            GatewayError::ServerRejected {
                operation: "remove",
                status: 500,
                message: "disk busy".into(),
            }
        );

        let unavailable = from_status(
            Operation::Resume,
            Some("t1"),
            StatusCode::SERVICE_UNAVAILABLE,
            "starting".into(),
        );
        assert!(matches!(unavailable, GatewayError::Unavailable { .. }));
    }

    #[test]
    fn list_failures_are_always_unavailable() {
        for status in [StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            assert!(matches!(
                from_status(Operation::List, None, status, "x".into()),
                GatewayError::Unavailable { operation: "list", .. }
            ));
        }
    }
}
