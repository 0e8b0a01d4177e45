//! Session builders for tests.

use seedline_core::{SessionId, SessionState, TorrentSession};

/// Magnet link whose info-hash normalises to `abcdef`.
pub const SAMPLE_MAGNET: &str = "magnet:?xt=urn:btih:ABCDEF";

/// Confirmed session in `state` with `progress` over a 1000-byte payload.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn session(id: &str, state: SessionState, progress: f64) -> TorrentSession {
    let downloading = state == SessionState::Downloading;
    TorrentSession {
        id: SessionId::confirmed(id),
        name: format!("{id}.iso"),
        state,
        progress,
        download_rate: if downloading { 1_024 } else { 0 },
        upload_rate: 0,
        total_size: 1_000,
        downloaded_size: (progress.clamp(0.0, 1.0) * 1_000.0) as u64,
        peer_count: u32::from(downloading),
        eta_seconds: downloading.then_some(60),
        last_error: None,
        info_hash: None,
    }
}

/// Session actively downloading.
#[must_use]
pub fn downloading(id: &str, progress: f64) -> TorrentSession {
    session(id, SessionState::Downloading, progress)
}

/// Completed session uploading to peers.
#[must_use]
pub fn seeding(id: &str) -> TorrentSession {
    session(id, SessionState::Seeding, 1.0)
}

/// Session paused by the user.
#[must_use]
pub fn paused(id: &str, progress: f64) -> TorrentSession {
    session(id, SessionState::Paused, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_respect_state() {
        assert_eq!(downloading("a", 0.5).downloaded_size, 500);
        assert_eq!(seeding("b").state, SessionState::Seeding);
        assert_eq!(paused("c", 0.2).download_rate, 0);
        assert_eq!(downloading("a", 0.5).eta_seconds, Some(60));
    }
}
