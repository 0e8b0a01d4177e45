#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Engine-agnostic session model, cache, and reconciliation for remote torrent control.
//!
//! Layout: `model/` (sessions, ids, sources, patches), `service/` (the
//! `RemoteGateway` boundary), `store.rs` (single-writer session cache),
//! `reconcile.rs` (poll snapshot merge), `classify.rs` (failure taxonomy),
//! `cadence.rs` (adaptive poll interval).

pub mod cadence;
pub mod classify;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod service;
pub mod store;

pub use cadence::{Cadence, next_interval};
pub use classify::{ErrorKind, RetryDisposition, classify};
pub use error::{GatewayError, GatewayResult, StoreError, StoreResult};
pub use model::{
    AddReceipt, FieldGroup, MagnetLink, MutationId, SessionId, SessionPatch, SessionState,
    TorrentSession, TorrentSource,
};
pub use reconcile::{MergeReport, PruneRule};
pub use service::RemoteGateway;
pub use store::{ACK_GRACE, SessionStore};
