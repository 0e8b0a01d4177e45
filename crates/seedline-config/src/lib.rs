#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! Layered client configuration: defaults, an optional JSON file, then environment.
//!
//! Layout: `model.rs` (typed sections), `loader.rs` (`ConfigLoader`),
//! `validate.rs` (validation/parsing helpers), `defaults.rs` (built-in values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::CONFIG_PATH_ENV;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use model::{ApiConfig, LogOutput, LogSettings, PollingConfig, SyncConfig};
pub use validate::validate;
