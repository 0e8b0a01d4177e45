use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::{SessionState, TorrentSession};

/// Disjoint slice of a session that an optimistic mutation may claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// The `state` field, driven by pause and resume.
    Lifecycle,
    /// Existence of the session, driven by add and remove.
    Presence,
}

impl FieldGroup {
    /// Lowercase label used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lifecycle => "lifecycle",
            Self::Presence => "presence",
        }
    }
}

impl Display for FieldGroup {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Provisional change layered over a confirmed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionPatch {
    /// Show the session in the given lifecycle state.
    State(SessionState),
    /// Hide the session while a removal is pending.
    Removal,
}

impl SessionPatch {
    /// Optimistic patch for a pause request.
    #[must_use]
    pub const fn pause() -> Self {
        Self::State(SessionState::Paused)
    }

    /// Optimistic patch for a resume request against `current`.
    #[must_use]
    pub fn resume(current: &TorrentSession) -> Self {
        if current.progress >= 1.0 {
            Self::State(SessionState::Seeding)
        } else {
            Self::State(SessionState::Downloading)
        }
    }

    /// Field group claimed by the patch.
    #[must_use]
    pub const fn group(self) -> FieldGroup {
        match self {
            Self::State(_) => FieldGroup::Lifecycle,
            Self::Removal => FieldGroup::Presence,
        }
    }

    /// Layer the patch over a confirmed session.
    ///
    /// Returns `None` when the patch hides the session entirely.
    #[must_use]
    pub fn apply(self, confirmed: &TorrentSession) -> Option<TorrentSession> {
        match self {
            Self::State(state) => {
                let mut view = confirmed.clone();
                view.state = state;
                if state == SessionState::Paused {
                    view.download_rate = 0;
                    view.upload_rate = 0;
                }
                Some(view)
            }
            Self::Removal => None,
        }
    }

    /// Whether an authoritative session already shows the intent of this patch.
    ///
    /// Resume targets are considered reflected as soon as the authority stops
    /// reporting the session as paused, since it may settle on any running state.
    #[must_use]
    pub fn is_reflected_by(self, remote: &TorrentSession) -> bool {
        match self {
            Self::State(SessionState::Paused) => remote.state == SessionState::Paused,
            Self::State(_) => remote.state != SessionState::Paused,
            Self::Removal => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionId;

    fn session(state: SessionState, progress: f64) -> TorrentSession {
        TorrentSession {
            state,
            progress,
            download_rate: 512,
            ..TorrentSession::provisional(SessionId::confirmed("t1"), "demo", None)
        }
    }

    #[test]
    fn resume_targets_depend_on_completion() {
        assert_eq!(
            SessionPatch::resume(&session(SessionState::Paused, 0.4)),
            SessionPatch::State(SessionState::Downloading)
        );
        assert_eq!(
            SessionPatch::resume(&session(SessionState::Paused, 1.0)),
            SessionPatch::State(SessionState::Seeding)
        );
    }

    #[test]
    fn pause_patch_zeroes_rates() {
        let view = SessionPatch::pause()
            .apply(&session(SessionState::Downloading, 0.2))
            .expect("pause keeps the session visible");
        assert_eq!(view.state, SessionState::Paused);
        assert_eq!(view.download_rate, 0);
        assert!(SessionPatch::Removal.apply(&view).is_none());
    }

    #[test]
    fn reflection_rules() {
        let paused = session(SessionState::Paused, 0.2);
        let downloading = session(SessionState::Downloading, 0.2);
        assert!(SessionPatch::pause().is_reflected_by(&paused));
        assert!(!SessionPatch::pause().is_reflected_by(&downloading));
        let resume = SessionPatch::State(SessionState::Downloading);
        assert!(resume.is_reflected_by(&session(SessionState::Checking, 0.2)));
        assert!(!resume.is_reflected_by(&paused));
        assert!(!SessionPatch::Removal.is_reflected_by(&downloading));
    }
}
