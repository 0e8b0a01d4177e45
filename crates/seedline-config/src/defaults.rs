//! Default values applied before any file or environment override.

/// Fast poll interval used while a session is transferring.
pub(crate) const FAST_POLL_MS: u64 = 1_000;
/// Slow poll interval used while every session is idle.
pub(crate) const SLOW_POLL_MS: u64 = 5_000;
/// Timeout for list and control requests.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 10;
/// Bounded wait for add requests.
pub(crate) const ADD_TIMEOUT_SECS: u64 = 60;
/// Consecutive polls a session may be missing before it is dropped.
pub(crate) const PRUNE_AFTER_MISSES: u32 = 2;
/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "SEEDLINE_CONFIG";
