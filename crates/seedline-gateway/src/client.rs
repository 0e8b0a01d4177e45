//! reqwest-backed [`RemoteGateway`] implementation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, RequestBuilder, StatusCode};
use seedline_core::{
    AddReceipt, GatewayError, GatewayResult, MagnetLink, RemoteGateway, TorrentSession,
    TorrentSource,
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::problem::{self, Operation};
use crate::wire::{AddRequest, AddResponse, DownloadsPath, WireTorrent};

/// Backend base URL used when none is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";

/// Connection settings for [`HttpGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Base URL of the backend API; routes are resolved relative to it.
    pub base_url: Url,
    /// Timeout applied to every request except `add`.
    pub request_timeout: Duration,
    /// Bounded wait for `add`, which may block on metadata resolution.
    pub add_timeout: Duration,
}

impl GatewayOptions {
    /// Options for `base_url` with default timeouts.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            request_timeout: Duration::from_secs(10),
            add_timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP gateway to the torrent backend.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
    add_timeout: Duration,
}

impl HttpGateway {
    /// Build a gateway with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unexpected`] when the HTTP client cannot be constructed.
    pub fn new(options: GatewayOptions) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| GatewayError::Unexpected {
                operation: "build_client",
                detail: err.to_string(),
            })?;
        Ok(Self::with_client(client, options))
    }

    /// Build a gateway around an existing client.
    #[must_use]
    pub fn with_client(client: Client, options: GatewayOptions) -> Self {
        let mut base_url = options.base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            add_timeout: options.add_timeout,
        }
    }

    /// Base URL every route is resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn route(&self, operation: Operation, path: &str) -> GatewayResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| GatewayError::Unexpected {
                operation: operation.as_str(),
                detail: format!("invalid route '{path}': {err}"),
            })
    }

    async fn send(
        &self,
        operation: Operation,
        id: Option<&str>,
        request: RequestBuilder,
    ) -> GatewayResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|err| problem::from_transport(operation, &err))?;
        if response.status().is_success() {
            return Ok(response);
        }
        let (status, detail) = problem::read_detail(response).await;
        debug!(operation = operation.as_str(), status = status.as_u16(), detail = %detail, "backend returned an error");
        Err(problem::from_status(operation, id, status, detail))
    }

    async fn decode<T: DeserializeOwned>(
        operation: Operation,
        response: reqwest::Response,
    ) -> GatewayResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| problem::from_transport(operation, &err))
    }

    /// Send a lifecycle command, treating "already in that state" as success.
    async fn lifecycle(&self, operation: Operation, verb: &str, id: &str) -> GatewayResult<()> {
        let url = self.route(operation, &format!("torrent/{verb}/{}", encode_segment(id)))?;
        match self.send(operation, Some(id), self.client.post(url)).await {
            Err(GatewayError::ServerRejected { status, .. })
                if status == StatusCode::CONFLICT.as_u16() =>
            {
                debug!(session_id = id, operation = operation.as_str(), "already in requested state");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }
}

async fn add_request(source: &TorrentSource) -> GatewayResult<AddRequest> {
    match source {
        TorrentSource::Magnet { uri } => {
            let link = MagnetLink::parse(uri)?;
            Ok(AddRequest::Magnet {
                magnet_link: link.uri().to_string(),
            })
        }
        TorrentSource::File { path } => {
            let bytes = tokio::fs::read(path).await.map_err(|err| {
                GatewayError::invalid(format!(
                    "failed to read torrent file '{}': {err}",
                    path.display()
                ))
            })?;
            Ok(AddRequest::Metainfo {
                metainfo: general_purpose::STANDARD.encode(&bytes),
                name: file_name(path),
            })
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

fn encode_segment(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    #[instrument(name = "gateway.add", skip(self, source))]
    async fn add(&self, source: TorrentSource) -> GatewayResult<AddReceipt> {
        let body = add_request(&source).await?;
        let url = self.route(Operation::Add, "torrent/add")?;
        let request = self.client.post(url).timeout(self.add_timeout).json(&body);
        let response = self.send(Operation::Add, None, request).await?;
        let added: AddResponse = Self::decode(Operation::Add, response).await?;
        Ok(AddReceipt {
            id: added.id.into_string(),
            name: added.name.filter(|name| !name.is_empty()),
            message: added.message,
        })
    }

    #[instrument(name = "gateway.list", skip(self))]
    async fn list(&self) -> GatewayResult<Vec<TorrentSession>> {
        let url = self.route(Operation::List, "torrent/list")?;
        let response = self.send(Operation::List, None, self.client.get(url)).await?;
        let torrents: Vec<WireTorrent> = Self::decode(Operation::List, response).await?;
        Ok(torrents.into_iter().map(WireTorrent::into_session).collect())
    }

    #[instrument(name = "gateway.remove", skip(self))]
    async fn remove(&self, id: &str, delete_files: bool) -> GatewayResult<()> {
        let mut url = self.route(Operation::Remove, &format!("torrent/{}", encode_segment(id)))?;
        url.query_pairs_mut()
            .append_pair("delete_files", if delete_files { "true" } else { "false" });
        self.send(Operation::Remove, Some(id), self.client.delete(url))
            .await
            .map(|_| ())
    }

    #[instrument(name = "gateway.pause", skip(self))]
    async fn pause(&self, id: &str) -> GatewayResult<()> {
        self.lifecycle(Operation::Pause, "pause", id).await
    }

    #[instrument(name = "gateway.resume", skip(self))]
    async fn resume(&self, id: &str) -> GatewayResult<()> {
        self.lifecycle(Operation::Resume, "resume", id).await
    }

    async fn open_downloads_folder(&self) -> GatewayResult<()> {
        let url = self.route(Operation::OpenDownloads, "downloads/open")?;
        self.send(Operation::OpenDownloads, None, self.client.post(url))
            .await
            .map(|_| ())
    }

    async fn downloads_path(&self) -> GatewayResult<String> {
        let url = self.route(Operation::DownloadsPath, "downloads/path")?;
        let response = self
            .send(Operation::DownloadsPath, None, self.client.get(url))
            .await?;
        let body: DownloadsPath = Self::decode(Operation::DownloadsPath, response).await?;
        Ok(body.path)
    }
}
