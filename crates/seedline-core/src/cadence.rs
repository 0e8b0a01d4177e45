//! Activity-adaptive poll interval.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::TorrentSession;

/// Pair of poll intervals chosen between by session activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    /// Interval while any session is active.
    pub fast: Duration,
    /// Interval when every session is idle or none are tracked.
    pub slow: Duration,
}

impl Cadence {
    /// Build a cadence from explicit intervals.
    #[must_use]
    pub const fn new(fast: Duration, slow: Duration) -> Self {
        Self { fast, slow }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5))
    }
}

/// Interval to wait before the next poll given the freshly merged sessions.
#[must_use]
pub fn next_interval(cadence: Cadence, sessions: &[TorrentSession]) -> Duration {
    if sessions.iter().any(|session| session.state.is_active()) {
        cadence.fast
    } else {
        cadence.slow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SessionId, SessionState};

    fn with_state(id: &str, state: SessionState) -> TorrentSession {
        TorrentSession {
            state,
            ..TorrentSession::provisional(SessionId::confirmed(id), id, None)
        }
    }

    #[test]
    fn idle_or_empty_snapshots_poll_slowly() {
        let cadence = Cadence::default();
        assert_eq!(next_interval(cadence, &[]), Duration::from_secs(5));
        let idle = [
            with_state("a", SessionState::Seeding),
            with_state("b", SessionState::Paused),
            with_state("c", SessionState::Finished),
            with_state("d", SessionState::Error),
            with_state("e", SessionState::Unknown),
        ];
        assert_eq!(next_interval(cadence, &idle), Duration::from_secs(5));
    }

    #[test]
    fn any_active_session_polls_fast() {
        let cadence = Cadence::new(Duration::from_millis(250), Duration::from_secs(10));
        for state in [
            SessionState::Downloading,
            SessionState::Checking,
            SessionState::MetadataFetching,
            SessionState::Pending,
        ] {
            let sessions = [
                with_state("a", SessionState::Seeding),
                with_state("b", state),
            ];
            assert_eq!(
                next_interval(cadence, &sessions),
                Duration::from_millis(250),
                "{state}"
            );
        }
    }
}
