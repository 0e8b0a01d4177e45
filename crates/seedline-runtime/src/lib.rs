#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Sync engine that keeps a local session cache aligned with a remote torrent service.
//!
//! The engine polls the gateway on an adaptive cadence, merges snapshots into
//! the store, applies control commands optimistically, and reports progress on
//! an event bus. One engine is created per UI context and torn down with
//! [`SyncEngine::shutdown`].

pub mod engine;
pub mod error;
pub mod scheduler;
pub mod status;

pub use engine::{AddOutcome, EngineOptions, SyncEngine};
pub use error::{ControlError, ControlResult};
pub use scheduler::PollScheduler;
pub use status::{StatusHandle, StatusSchedule};
