#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! HTTP adapter for the torrent backend.
//!
//! Layout: `client.rs` (the [`HttpGateway`] itself), `wire.rs` (request and
//! response bodies), `problem.rs` (status and body to error mapping).

mod client;
mod problem;
mod wire;

pub use client::{DEFAULT_API_URL, GatewayOptions, HttpGateway};
