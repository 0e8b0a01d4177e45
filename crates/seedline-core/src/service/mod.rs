//! Boundary trait implemented by remote torrent authorities.

use async_trait::async_trait;

use crate::error::{GatewayError, GatewayResult};
use crate::model::{AddReceipt, TorrentSession, TorrentSource};

/// Typed access to the authoritative torrent backend.
///
/// Implementations hold no session state. Sessions returned from
/// [`RemoteGateway::list`] must carry confirmed identifiers.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Admit a torrent from a magnet link or metainfo file.
    async fn add(&self, source: TorrentSource) -> GatewayResult<AddReceipt>;

    /// Fetch every session known to the authority.
    async fn list(&self) -> GatewayResult<Vec<TorrentSession>>;

    /// Remove a session, optionally deleting its payload.
    async fn remove(&self, id: &str, delete_files: bool) -> GatewayResult<()>;

    /// Pause a session.
    async fn pause(&self, id: &str) -> GatewayResult<()>;

    /// Resume a paused session.
    async fn resume(&self, id: &str) -> GatewayResult<()>;

    /// Ask the authority to reveal its download folder; default reports lack of support.
    async fn open_downloads_folder(&self) -> GatewayResult<()> {
        Err(GatewayError::Unexpected {
            operation: "open_downloads_folder",
            detail: "not supported by this gateway".to_string(),
        })
    }

    /// Download folder used by the authority; default reports lack of support.
    async fn downloads_path(&self) -> GatewayResult<String> {
        Err(GatewayError::Unexpected {
            operation: "downloads_path",
            detail: "not supported by this gateway".to_string(),
        })
    }
}
