//! Request and response bodies exchanged with the backend.

use seedline_core::{SessionId, SessionState, TorrentSession};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum AddRequest {
    Magnet {
        magnet_link: String,
    },
    Metainfo {
        metainfo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddResponse {
    pub(crate) id: WireId,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// Identifiers arrive as strings from some backends and integers from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(u64),
}

impl WireId {
    pub(crate) fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadsPath {
    pub(crate) path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProblemBody {
    #[serde(default)]
    pub(crate) detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTorrent {
    id: WireId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    download_speed: Option<f64>,
    #[serde(default)]
    upload_speed: Option<f64>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    total_size: Option<f64>,
    #[serde(default)]
    downloaded: Option<f64>,
    #[serde(default, alias = "timeRemaining")]
    eta_seconds: Option<f64>,
    #[serde(default, alias = "peers")]
    num_peers: Option<f64>,
    #[serde(default)]
    info_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn non_negative(value: Option<f64>) -> u64 {
    value
        .filter(|number| number.is_finite() && *number > 0.0)
        .map_or(0, |number| number.floor() as u64)
}

impl WireTorrent {
    pub(crate) fn into_session(self) -> TorrentSession {
        let id = self.id.into_string();
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        let state = self
            .state
            .as_deref()
            .map_or(SessionState::Unknown, SessionState::from_wire);
        let eta_seconds = self
            .eta_seconds
            .filter(|eta| eta.is_finite() && *eta >= 0.0)
            .map(|eta| non_negative(Some(eta)));
        let peer_count = u32::try_from(non_negative(self.num_peers)).unwrap_or(u32::MAX);

        TorrentSession {
            id: SessionId::confirmed(id),
            name,
            state,
            progress: self.progress.unwrap_or(0.0),
            download_rate: non_negative(self.download_speed),
            upload_rate: non_negative(self.upload_speed),
            total_size: non_negative(self.total_size),
            downloaded_size: non_negative(self.downloaded),
            peer_count,
            eta_seconds,
            last_error: self.error.filter(|error| !error.trim().is_empty()),
            info_hash: self.info_hash,
        }
        .normalized()
    }
}
