//! Command handlers grouped by concern.

pub(crate) mod torrents;
pub(crate) mod watch;
