//! Merge of authoritative poll snapshots into the session table.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{FieldGroup, SessionId, SessionPatch, SessionState, TorrentSession};
use crate::store::{ACK_GRACE, SessionEntry, SessionTable};

/// How many consecutive successful polls a session may be missing from before it is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneRule {
    /// Consecutive absences required; never below one.
    pub after_misses: u32,
}

impl PruneRule {
    /// Build a rule, clamping `after_misses` to at least one.
    #[must_use]
    pub const fn new(after_misses: u32) -> Self {
        Self {
            after_misses: if after_misses == 0 { 1 } else { after_misses },
        }
    }
}

impl Default for PruneRule {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Outcome of merging one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Sessions seen for the first time.
    pub added: usize,
    /// Confirmed sessions whose fields changed.
    pub updated: usize,
    /// Sessions dropped from the cache.
    pub pruned: usize,
    /// Provisional sessions replaced by their authoritative entry.
    pub promoted: usize,
    /// Overlays retired because the poll reflected them or their grace lapsed.
    pub overlays_cleared: usize,
}

impl MergeReport {
    /// Whether the merge produced any observable change.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.added + self.updated + self.pruned + self.promoted + self.overlays_cleared > 0
    }
}

pub(crate) fn merge(
    table: &mut SessionTable,
    remote: Vec<TorrentSession>,
    rule: PruneRule,
    now: Instant,
) -> MergeReport {
    let mut report = MergeReport::default();
    let mut seen: HashSet<SessionId> = HashSet::with_capacity(remote.len());

    for incoming in remote {
        let incoming = incoming.normalized();
        if incoming.id.is_provisional() || !seen.insert(incoming.id.clone()) {
            continue;
        }
        if table.entries.contains_key(&incoming.id) {
            collapse_provisional(table, &incoming, &mut report);
            refresh(table, incoming, now, &mut report);
        } else if let Some(provisional) = match_provisional(table, &incoming) {
            promote(table, &provisional, incoming, &mut report);
        } else {
            debug!(session_id = %incoming.id, "session discovered by poll");
            table.order.push(incoming.id.clone());
            table
                .entries
                .insert(incoming.id.clone(), SessionEntry::confirmed(incoming));
            report.added += 1;
        }
    }

    prune_absent(table, &seen, rule, now, &mut report);
    report
}

fn claims(entry: &SessionEntry, incoming: &TorrentSession, by_key: bool) -> bool {
    let Some(pending_add) = entry.pending_add.as_ref() else {
        return false;
    };
    if by_key {
        let remote_key = incoming.dedup_key();
        pending_add.dedup_key.is_some() && pending_add.dedup_key == remote_key
    } else {
        pending_add.assigned_id.as_deref() == incoming.id.as_confirmed()
    }
}

fn match_provisional(table: &SessionTable, incoming: &TorrentSession) -> Option<SessionId> {
    [false, true].into_iter().find_map(|by_key| {
        table
            .order
            .iter()
            .find(|id| {
                table
                    .entries
                    .get(*id)
                    .is_some_and(|entry| claims(entry, incoming, by_key))
            })
            .cloned()
    })
}

/// Replace a provisional entry in place by its authoritative counterpart.
fn promote(
    table: &mut SessionTable,
    provisional: &SessionId,
    incoming: TorrentSession,
    report: &mut MergeReport,
) {
    let id = incoming.id.clone();
    debug!(provisional_id = %provisional, session_id = %id, "provisional session promoted");
    table.rekey(provisional, id, SessionEntry::confirmed(incoming));
    report.promoted += 1;
}

/// Drop provisional twins of a session the cache already tracks under its confirmed id.
fn collapse_provisional(
    table: &mut SessionTable,
    incoming: &TorrentSession,
    report: &mut MergeReport,
) {
    while let Some(provisional) = match_provisional(table, incoming) {
        table.evict(&provisional);
        report.pruned += 1;
    }
}

fn lapsed(acknowledged_at: Option<Instant>, now: Instant) -> bool {
    acknowledged_at.is_some_and(|at| now.saturating_duration_since(at) >= ACK_GRACE)
}

fn refresh(
    table: &mut SessionTable,
    mut incoming: TorrentSession,
    now: Instant,
    report: &mut MergeReport,
) {
    let Some(entry) = table.entries.get_mut(&incoming.id) else {
        return;
    };
    entry.missed_polls = 0;

    let confirmed = &entry.confirmed;
    let either_failed =
        incoming.state == SessionState::Error || confirmed.state == SessionState::Error;
    if incoming.progress < confirmed.progress && !either_failed {
        incoming.progress = confirmed.progress;
    }

    // A reflected overlay settles even while its call is in flight; the late
    // confirm or reject then finds nothing to act on.
    let mut settled = Vec::new();
    let before = entry.overlays.len();
    entry.overlays.retain(|_, overlay| {
        if overlay.patch.is_reflected_by(&incoming) {
            if overlay.acknowledged_at.is_none() {
                settled.push(overlay.mutation_id);
            }
            return false;
        }
        !lapsed(overlay.acknowledged_at, now)
    });
    report.overlays_cleared += before - entry.overlays.len();

    if entry.confirmed != incoming {
        entry.confirmed = incoming;
        report.updated += 1;
    }
    for mutation_id in settled {
        table.pending.remove(&mutation_id);
    }
}

fn prune_absent(
    table: &mut SessionTable,
    seen: &HashSet<SessionId>,
    rule: PruneRule,
    now: Instant,
    report: &mut MergeReport,
) {
    let absent: Vec<SessionId> = table
        .order
        .iter()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();

    for id in absent {
        let Some(entry) = table.entries.get_mut(&id) else {
            continue;
        };
        let prune = if let Some(pending_add) = entry.pending_add.as_ref() {
            lapsed(pending_add.acknowledged_at, now)
        } else if entry
            .overlays
            .get(&FieldGroup::Presence)
            .is_some_and(|overlay| overlay.patch == SessionPatch::Removal)
        {
            true
        } else {
            entry.missed_polls += 1;
            entry.missed_polls >= rule.after_misses
        };

        if prune {
            table.evict(&id);
            report.pruned += 1;
            debug!(session_id = %id, "session pruned after leaving the snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddReceipt, MagnetLink, MutationId};
    use crate::store::SessionStore;

    fn remote(id: &str, state: SessionState, progress: f64) -> TorrentSession {
        TorrentSession {
            state,
            progress,
            total_size: 1_000,
            download_rate: if state == SessionState::Downloading { 64 } else { 0 },
            ..TorrentSession::provisional(SessionId::confirmed(id), id, None)
        }
    }

    fn ids(store: &SessionStore) -> Vec<String> {
        store
            .snapshot()
            .into_iter()
            .map(|session| session.id.to_string())
            .collect()
    }

    #[test]
    fn merging_the_same_snapshot_twice_is_idempotent() {
        let store = SessionStore::default();
        let snapshot = vec![
            remote("a", SessionState::Downloading, 0.3),
            remote("b", SessionState::Seeding, 1.0),
        ];
        let first = store.merge(snapshot.clone());
        assert_eq!(first.added, 2);
        let view = store.snapshot();
        let revision = store.revision();

        let second = store.merge(snapshot);
        assert!(!second.changed());
        assert_eq!(store.snapshot(), view);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn sessions_are_pruned_after_two_consecutive_absences() {
        let store = SessionStore::default();
        store.merge(vec![
            remote("a", SessionState::Seeding, 1.0),
            remote("b", SessionState::Seeding, 1.0),
        ]);

        let only_a = vec![remote("a", SessionState::Seeding, 1.0)];
        assert_eq!(store.merge(only_a.clone()).pruned, 0);
        assert_eq!(ids(&store), vec!["a", "b"]);

        assert_eq!(store.merge(only_a).pruned, 1);
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn reappearing_resets_the_miss_counter() {
        let store = SessionStore::default();
        let both = vec![
            remote("a", SessionState::Seeding, 1.0),
            remote("b", SessionState::Seeding, 1.0),
        ];
        let only_a = vec![remote("a", SessionState::Seeding, 1.0)];
        store.merge(both.clone());
        store.merge(only_a.clone());
        store.merge(both);
        store.merge(only_a);
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn pending_removal_is_pruned_on_first_absence() {
        let store = SessionStore::default();
        store.merge(vec![
            remote("a", SessionState::Seeding, 1.0),
            remote("b", SessionState::Paused, 0.5),
        ]);
        store
            .apply_optimistic(
                &SessionId::confirmed("b"),
                SessionPatch::Removal,
                MutationId::new(),
            )
            .expect("removal accepted");
        assert_eq!(ids(&store), vec!["a"]);

        let report = store.merge(vec![remote("a", SessionState::Seeding, 1.0)]);
        assert_eq!(report.pruned, 1);
        assert_eq!(store.in_flight(), 0);
    }

    #[test]
    fn provisional_add_is_replaced_in_place_by_assigned_id() -> anyhow::Result<()> {
        let store = SessionStore::default();
        store.merge(vec![remote("z", SessionState::Seeding, 1.0)]);

        let link = MagnetLink::parse("magnet:?xt=urn:btih:ABCDEF")?;
        let mutation = MutationId::new();
        let provisional = store.insert_provisional(
            link.provisional_name(),
            Some(link.info_hash().to_string()),
            mutation,
        )?;
        store.merge(vec![
            remote("y", SessionState::Seeding, 1.0),
            remote("z", SessionState::Seeding, 1.0),
        ]);
        assert_eq!(
            ids(&store),
            vec!["z".to_string(), provisional.to_string(), "y".to_string()]
        );

        let receipt = AddReceipt {
            id: "t1".into(),
            name: None,
            message: None,
        };
        assert_eq!(store.confirm_add(mutation, &receipt), Some(provisional.clone()));
        let pending = store.get(&provisional).expect("still visible");
        assert_eq!(pending.name, "magnet:abcdef");
        assert_eq!(pending.state, SessionState::Pending);

        let report = store.merge(vec![
            remote("z", SessionState::Seeding, 1.0),
            remote("t1", SessionState::MetadataFetching, 0.0),
            remote("y", SessionState::Seeding, 1.0),
        ]);
        assert_eq!(report.promoted, 1);
        assert_eq!(ids(&store), vec!["z", "t1", "y"]);
        let promoted = store
            .get(&SessionId::confirmed("t1"))
            .expect("promoted session");
        assert_eq!(promoted.state, SessionState::MetadataFetching);
        assert!(store.get(&provisional).is_none());
        Ok(())
    }

    #[test]
    fn provisional_add_matches_by_info_hash_before_the_receipt() -> anyhow::Result<()> {
        let store = SessionStore::default();
        let mutation = MutationId::new();
        store.insert_provisional("demo", Some("abcdef".into()), mutation)?;

        let mut hashed = remote("t9", SessionState::Downloading, 0.1);
        hashed.info_hash = Some("ABCDEF".into());
        let report = store.merge(vec![hashed]);
        assert_eq!(report.promoted, 1);
        assert_eq!(ids(&store), vec!["t9"]);

        let receipt = AddReceipt {
            id: "t9".into(),
            name: None,
            message: None,
        };
        assert_eq!(
            store.confirm_add(mutation, &receipt),
            Some(SessionId::confirmed("t9"))
        );
        assert_eq!(store.in_flight(), 0);
        Ok(())
    }

    #[test]
    fn unacknowledged_add_is_never_pruned() -> anyhow::Result<()> {
        let store = SessionStore::default();
        store.insert_provisional("demo", None, MutationId::new())?;
        for _ in 0..5 {
            store.merge(Vec::new());
        }
        assert_eq!(store.snapshot().len(), 1);
        Ok(())
    }

    #[test]
    fn acknowledged_add_lapses_after_grace() -> anyhow::Result<()> {
        let store = SessionStore::default();
        let mutation = MutationId::new();
        store.insert_provisional("demo", None, mutation)?;
        let receipt = AddReceipt {
            id: "t1".into(),
            name: None,
            message: None,
        };
        store.confirm_add(mutation, &receipt);
        let now = Instant::now();
        for _ in 0..5 {
            store.merge_at(Vec::new(), now);
        }
        assert_eq!(store.snapshot().len(), 1);
        store.merge_at(Vec::new(), now + ACK_GRACE);
        assert!(store.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn stale_progress_is_ignored_unless_in_error() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.6)]);

        let mut stale = remote("a", SessionState::Downloading, 0.4);
        stale.download_rate = 99;
        store.merge(vec![stale]);
        let view = store.get(&SessionId::confirmed("a")).expect("tracked");
        assert!((view.progress - 0.6).abs() < f64::EPSILON);
        assert_eq!(view.download_rate, 99);

        store.merge(vec![remote("a", SessionState::Error, 0.1)]);
        let view = store.get(&SessionId::confirmed("a")).expect("tracked");
        assert!((view.progress - 0.1).abs() < f64::EPSILON);
        assert_eq!(view.state, SessionState::Error);
    }

    #[test]
    fn unacknowledged_overlay_survives_a_lagging_poll() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.2)]);
        let id = SessionId::confirmed("a");
        store
            .apply_optimistic(&id, SessionPatch::pause(), MutationId::new())
            .expect("pause");

        store.merge(vec![remote("a", SessionState::Downloading, 0.3)]);
        let view = store.get(&id).expect("tracked");
        assert_eq!(view.state, SessionState::Paused);
        assert!((view.progress - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn acknowledged_overlay_clears_when_reflected() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.2)]);
        let id = SessionId::confirmed("a");
        let pause = MutationId::new();
        store
            .apply_optimistic(&id, SessionPatch::pause(), pause)
            .expect("pause");
        store.confirm(pause);

        let report = store.merge(vec![remote("a", SessionState::Paused, 0.2)]);
        assert_eq!(report.overlays_cleared, 1);
        assert_eq!(store.get(&id).map(|s| s.state), Some(SessionState::Paused));
    }

    #[test]
    fn server_truth_wins_after_grace() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.2)]);
        let id = SessionId::confirmed("a");
        let pause = MutationId::new();
        store
            .apply_optimistic(&id, SessionPatch::pause(), pause)
            .expect("pause");
        store.confirm(pause);

        let lagging = vec![remote("a", SessionState::Downloading, 0.2)];
        store.merge_at(lagging.clone(), Instant::now() + ACK_GRACE / 2);
        assert_eq!(store.get(&id).map(|s| s.state), Some(SessionState::Paused));
        store.merge_at(lagging, Instant::now() + ACK_GRACE);
        assert_eq!(
            store.get(&id).map(|s| s.state),
            Some(SessionState::Downloading)
        );
    }

    #[test]
    fn repeated_lagging_merges_leave_an_acknowledged_overlay_alone() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.2)]);
        let id = SessionId::confirmed("a");
        let pause = MutationId::new();
        store
            .apply_optimistic(&id, SessionPatch::pause(), pause)
            .expect("pause");
        store.confirm(pause);
        let view = store.snapshot();
        let revision = store.revision();

        let lagging = vec![remote("a", SessionState::Downloading, 0.2)];
        let now = Instant::now();
        for _ in 0..6 {
            assert!(!store.merge_at(lagging.clone(), now).changed());
        }
        assert_eq!(store.snapshot(), view);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn reflected_overlay_settles_before_its_call_returns() {
        let store = SessionStore::default();
        store.merge(vec![remote("a", SessionState::Downloading, 0.2)]);
        let id = SessionId::confirmed("a");
        let pause = MutationId::new();
        store
            .apply_optimistic(&id, SessionPatch::pause(), pause)
            .expect("pause");

        let report = store.merge(vec![remote("a", SessionState::Paused, 0.2)]);
        assert_eq!(report.overlays_cleared, 1);
        assert_eq!(store.in_flight(), 0);
        assert!(!store.confirm(pause));
        assert!(!store.reject(pause, "late failure"));
        assert_eq!(store.get(&id).map(|s| s.state), Some(SessionState::Paused));

        let current = store.get(&id).expect("tracked");
        store
            .apply_optimistic(&id, SessionPatch::resume(&current), MutationId::new())
            .expect("resume is no longer blocked");
        assert_eq!(
            store.get(&id).map(|s| s.state),
            Some(SessionState::Downloading)
        );
    }

    #[test]
    fn duplicate_ids_in_a_snapshot_keep_the_first() {
        let store = SessionStore::default();
        let report = store.merge(vec![
            remote("a", SessionState::Downloading, 0.2),
            remote("a", SessionState::Seeding, 1.0),
        ]);
        assert_eq!(report.added, 1);
        assert_eq!(
            store.get(&SessionId::confirmed("a")).map(|s| s.state),
            Some(SessionState::Downloading)
        );
    }

    #[test]
    fn zero_misses_is_clamped() {
        assert_eq!(PruneRule::new(0).after_misses, 1);
    }
}
