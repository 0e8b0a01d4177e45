//! Core session domain types shared across the workspace.

mod magnet;
mod patch;

use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use magnet::{MagnetLink, normalize_info_hash};
pub use patch::{FieldGroup, SessionPatch};

const PROVISIONAL_PREFIX: &str = "pending-";

/// Identifier for a tracked session.
///
/// Confirmed ids are assigned by the remote authority. Provisional ids are
/// minted locally for sessions whose admission has not been observed in a
/// poll snapshot yet, and are replaced during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionId {
    /// Authority-assigned identifier.
    Confirmed(String),
    /// Locally minted placeholder for a pending add.
    Provisional(Uuid),
}

impl SessionId {
    /// Wrap an authority-assigned identifier.
    #[must_use]
    pub fn confirmed(id: impl Into<String>) -> Self {
        Self::Confirmed(id.into())
    }

    /// Mint a fresh provisional identifier.
    #[must_use]
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    /// Whether the id is a local placeholder.
    #[must_use]
    pub const fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    /// Authority-assigned id, when confirmed.
    #[must_use]
    pub fn as_confirmed(&self) -> Option<&str> {
        match self {
            Self::Confirmed(id) => Some(id.as_str()),
            Self::Provisional(_) => None,
        }
    }
}

impl Display for SessionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(id) => formatter.write_str(id),
            Self::Provisional(id) => write!(formatter, "{PROVISIONAL_PREFIX}{id}"),
        }
    }
}

impl FromStr for SessionId {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let provisional = value
            .strip_prefix(PROVISIONAL_PREFIX)
            .and_then(|raw| Uuid::parse_str(raw).ok());
        Ok(provisional.map_or_else(|| Self::confirmed(value), Self::Provisional))
    }
}

/// Lifecycle state of a torrent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Admitted locally, not yet reported by the authority.
    Pending,
    /// Resolving metadata for a magnet link.
    MetadataFetching,
    /// Verifying on-disk data.
    Checking,
    /// Transferring payload.
    Downloading,
    /// Complete and uploading to peers.
    Seeding,
    /// Stopped by the user.
    Paused,
    /// Complete and not seeding.
    Finished,
    /// The authority reported a failure.
    Error,
    /// The authority reported a state this client does not recognise.
    Unknown,
}

impl SessionState {
    /// Decode a state string reported by the authority.
    ///
    /// Unrecognised values map to [`SessionState::Unknown`] instead of failing.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "queued_for_checking" => Self::Pending,
            "metadata_downloading" | "downloading_metadata" | "fetching_metadata" => {
                Self::MetadataFetching
            }
            "checking" | "checking_files" | "checking_resume_data" | "allocating" => {
                Self::Checking
            }
            "downloading" => Self::Downloading,
            "seeding" => Self::Seeding,
            "paused" | "stopped" => Self::Paused,
            "finished" | "complete" | "completed" => Self::Finished,
            "error" | "failed" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Lowercase label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MetadataFetching => "metadata_fetching",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the session is doing work that changes quickly enough to warrant fast polling.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::MetadataFetching | Self::Checking | Self::Downloading
        )
    }
}

impl Display for SessionState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// UI-facing snapshot of a single torrent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSession {
    /// Session identifier.
    pub id: SessionId,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: SessionState,
    /// Completion ratio in `[0, 1]`.
    pub progress: f64,
    /// Download rate in bytes per second.
    pub download_rate: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    /// Payload size in bytes; zero while metadata is unknown.
    pub total_size: u64,
    /// Bytes downloaded so far, never above `total_size` once it is known.
    pub downloaded_size: u64,
    /// Connected peers.
    pub peer_count: u32,
    /// Seconds until completion; `None` while unknown or calculating.
    pub eta_seconds: Option<u64>,
    /// Most recent failure reported by the authority.
    pub last_error: Option<String>,
    /// Normalised info-hash, when the authority or the source exposes one.
    pub info_hash: Option<String>,
}

impl TorrentSession {
    /// Build a placeholder session for a pending add.
    #[must_use]
    pub fn provisional(id: SessionId, name: impl Into<String>, info_hash: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: SessionState::Pending,
            progress: 0.0,
            download_rate: 0,
            upload_rate: 0,
            total_size: 0,
            downloaded_size: 0,
            peer_count: 0,
            eta_seconds: None,
            last_error: None,
            info_hash,
        }
    }

    /// Clamp numeric fields into their documented ranges and prefer the byte
    /// ratio for progress when sizes are known.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.total_size > 0 && self.downloaded_size > self.total_size {
            self.downloaded_size = self.total_size;
        }
        if self.total_size == 0 {
            self.downloaded_size = 0;
        }
        if !self.progress.is_finite() {
            self.progress = 0.0;
        }
        self.progress = self.progress.clamp(0.0, 1.0);
        // Byte counts win over the reported fraction when both sizes are known.
        if self.total_size > 0 && self.downloaded_size > 0 {
            self.progress = ratio(self.downloaded_size, self.total_size);
        }
        self.info_hash = self.info_hash.as_deref().and_then(normalize_info_hash);
        self
    }

    /// Stable identity used to match provisional sessions against the authority.
    ///
    /// Prefers the reported info-hash; falls back to the id when the authority
    /// uses info-hashes as identifiers.
    #[must_use]
    pub fn dedup_key(&self) -> Option<String> {
        if let Some(hash) = &self.info_hash {
            return Some(hash.clone());
        }
        self.id
            .as_confirmed()
            .filter(|id| looks_like_info_hash(id))
            .map(str::to_ascii_lowercase)
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    (part as f64 / whole as f64).clamp(0.0, 1.0)
}

fn looks_like_info_hash(value: &str) -> bool {
    match value.len() {
        40 | 64 => value.chars().all(|ch| ch.is_ascii_hexdigit()),
        32 => value
            .chars()
            .all(|ch| ch.is_ascii_alphabetic() || ('2'..='7').contains(&ch)),
        _ => false,
    }
}

/// Source describing how a torrent should be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TorrentSource {
    /// Magnet URI to resolve.
    Magnet {
        /// Raw magnet URI.
        uri: String,
    },
    /// Path to a `.torrent` metainfo file.
    File {
        /// Location of the metainfo file.
        path: PathBuf,
    },
}

impl TorrentSource {
    #[must_use]
    /// Convenience constructor for magnet-based sources.
    pub fn magnet(uri: impl Into<String>) -> Self {
        Self::Magnet { uri: uri.into() }
    }

    #[must_use]
    /// Convenience constructor for file-based sources.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    /// Interpret free-form user input: magnet URIs stay magnets, anything else is a path.
    #[must_use]
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.starts_with("magnet:") {
            Self::magnet(trimmed)
        } else {
            Self::file(trimmed)
        }
    }
}

/// Authority response to a successful add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReceipt {
    /// Authority-assigned identifier.
    pub id: String,
    /// Display name, when the authority already knows it.
    pub name: Option<String>,
    /// Human-readable confirmation from the authority.
    pub message: Option<String>,
}

/// Identifier tagging an optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Mint a fresh mutation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MutationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}
