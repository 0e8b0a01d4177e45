//! Single-writer in-memory cache of torrent sessions.
//!
//! The store keeps the last confirmed copy of each session plus at most one
//! optimistic overlay per [`FieldGroup`]. Readers only ever see the layered
//! view returned by [`SessionStore::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    AddReceipt, FieldGroup, MutationId, SessionId, SessionPatch, TorrentSession,
};
use crate::reconcile::{self, MergeReport, PruneRule};

/// How long an acknowledged change stays visible without the authority
/// reflecting it. Measured from the acknowledgement, not in merges, so
/// re-merging an identical snapshot never changes the view.
pub const ACK_GRACE: Duration = Duration::from_secs(15);

/// Thread-safe session cache shared by the poll loop and control calls.
#[derive(Debug, Default)]
pub struct SessionStore {
    table: Mutex<SessionTable>,
    prune: PruneRule,
}

#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    pub(crate) order: Vec<SessionId>,
    pub(crate) entries: HashMap<SessionId, SessionEntry>,
    pub(crate) pending: HashMap<MutationId, PendingMutation>,
    pub(crate) revision: u64,
    pub(crate) closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingMutation {
    pub(crate) id: SessionId,
    pub(crate) group: FieldGroup,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionEntry {
    pub(crate) confirmed: TorrentSession,
    pub(crate) overlays: BTreeMap<FieldGroup, Overlay>,
    pub(crate) pending_add: Option<PendingAdd>,
    pub(crate) missed_polls: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct Overlay {
    pub(crate) mutation_id: MutationId,
    pub(crate) patch: SessionPatch,
    pub(crate) acknowledged_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingAdd {
    pub(crate) mutation_id: MutationId,
    pub(crate) dedup_key: Option<String>,
    pub(crate) assigned_id: Option<String>,
    pub(crate) acknowledged_at: Option<Instant>,
}

impl SessionEntry {
    pub(crate) fn confirmed(session: TorrentSession) -> Self {
        Self {
            confirmed: session,
            overlays: BTreeMap::new(),
            pending_add: None,
            missed_polls: 0,
        }
    }

    pub(crate) fn view(&self) -> Option<TorrentSession> {
        let mut view = self.confirmed.clone();
        for overlay in self.overlays.values() {
            view = overlay.patch.apply(&view)?;
        }
        Some(view)
    }

    pub(crate) fn matches_key(&self, key: &str) -> bool {
        let pending = self
            .pending_add
            .as_ref()
            .and_then(|pending| pending.dedup_key.as_deref());
        pending == Some(key) || self.confirmed.dedup_key().as_deref() == Some(key)
    }
}

impl SessionTable {
    pub(crate) fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Drop an entry together with every mutation still pointing at it.
    pub(crate) fn evict(&mut self, id: &SessionId) -> Option<SessionEntry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|candidate| candidate != id);
        self.pending.retain(|_, pending| &pending.id != id);
        Some(entry)
    }

    /// Move an entry to a new key without changing its position.
    pub(crate) fn rekey(&mut self, from: &SessionId, to: SessionId, entry: SessionEntry) {
        self.entries.remove(from);
        if let Some(slot) = self.order.iter_mut().find(|candidate| *candidate == from) {
            slot.clone_from(&to);
        }
        for pending in self.pending.values_mut() {
            if &pending.id == from {
                pending.id.clone_from(&to);
            }
        }
        self.entries.insert(to, entry);
    }

    pub(crate) fn find_by_dedup_key(&self, key: &str) -> Option<&SessionId> {
        self.order.iter().find(|id| {
            self.entries
                .get(*id)
                .is_some_and(|entry| entry.view().is_some() && entry.matches_key(key))
        })
    }

    fn views(&self) -> Vec<TorrentSession> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter_map(SessionEntry::view)
            .collect()
    }
}

impl SessionStore {
    /// Create an empty store that prunes absent sessions according to `prune`.
    #[must_use]
    pub fn new(prune: PruneRule) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            prune,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ordered, overlay-applied view of every visible session.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TorrentSession> {
        self.lock().views()
    }

    /// Layered view of a single session; `None` when unknown or hidden by a pending removal.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<TorrentSession> {
        self.lock().entries.get(id).and_then(SessionEntry::view)
    }

    /// Identifier of the visible session carrying `key` as its dedup key.
    #[must_use]
    pub fn find_by_dedup_key(&self, key: &str) -> Option<SessionId> {
        self.lock().find_by_dedup_key(key).cloned()
    }

    /// Counter bumped on every observable change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Whether [`SessionStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of optimistic mutations still waiting for their outcome.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    /// Stop accepting changes; every later mutating call becomes inert.
    pub fn close(&self) {
        let mut table = self.lock();
        if !table.closed {
            table.closed = true;
            table.pending.clear();
            debug!("session store closed");
        }
    }

    /// Insert or replace the confirmed copy of a session.
    pub fn upsert(&self, session: TorrentSession) {
        let session = session.normalized();
        let mut table = self.lock();
        if table.closed {
            return;
        }
        let id = session.id.clone();
        if let Some(entry) = table.entries.get_mut(&id) {
            entry.missed_polls = 0;
            if entry.confirmed == session {
                return;
            }
            entry.confirmed = session;
        } else {
            table.order.push(id.clone());
            table.entries.insert(id, SessionEntry::confirmed(session));
        }
        table.bump();
    }

    /// Remove a session outright, discarding any overlays it carried.
    pub fn remove(&self, id: &SessionId) -> Option<TorrentSession> {
        let mut table = self.lock();
        if table.closed {
            return None;
        }
        let entry = table.evict(id)?;
        table.bump();
        Some(entry.confirmed)
    }

    /// Layer an optimistic patch over a confirmed session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when an unresolved mutation already
    /// claims the patch's field group, [`StoreError::UnknownSession`] when the
    /// id is not tracked, [`StoreError::ProvisionalSession`] when the session
    /// has not been confirmed yet, and [`StoreError::Closed`] after
    /// [`SessionStore::close`].
    pub fn apply_optimistic(
        &self,
        id: &SessionId,
        patch: SessionPatch,
        mutation_id: MutationId,
    ) -> StoreResult<()> {
        let mut table = self.lock();
        if table.closed {
            return Err(StoreError::Closed);
        }
        if id.is_provisional() {
            return Err(StoreError::ProvisionalSession { id: id.clone() });
        }
        let group = patch.group();
        let entry = table
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownSession { id: id.clone() })?;
        if entry.view().is_none() && group != FieldGroup::Presence {
            return Err(StoreError::UnknownSession { id: id.clone() });
        }
        if entry
            .overlays
            .get(&group)
            .is_some_and(|overlay| overlay.acknowledged_at.is_none())
        {
            debug!(session_id = %id, group = %group, "optimistic mutation conflicts with one in flight");
            return Err(StoreError::Conflict {
                id: id.clone(),
                group,
            });
        }
        entry.overlays.insert(
            group,
            Overlay {
                mutation_id,
                patch,
                acknowledged_at: None,
            },
        );
        table.pending.insert(
            mutation_id,
            PendingMutation {
                id: id.clone(),
                group,
            },
        );
        table.bump();
        Ok(())
    }

    /// Record a pending add as a provisional session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] carrying the existing id when a visible
    /// session already uses `dedup_key`, and [`StoreError::Closed`] after
    /// [`SessionStore::close`].
    pub fn insert_provisional(
        &self,
        name: impl Into<String>,
        dedup_key: Option<String>,
        mutation_id: MutationId,
    ) -> StoreResult<SessionId> {
        let mut table = self.lock();
        if table.closed {
            return Err(StoreError::Closed);
        }
        if let Some(existing) = dedup_key
            .as_deref()
            .and_then(|key| table.find_by_dedup_key(key))
        {
            return Err(StoreError::Conflict {
                id: existing.clone(),
                group: FieldGroup::Presence,
            });
        }
        let id = SessionId::provisional();
        let mut entry = SessionEntry::confirmed(TorrentSession::provisional(
            id.clone(),
            name,
            dedup_key.clone(),
        ));
        entry.pending_add = Some(PendingAdd {
            mutation_id,
            dedup_key,
            assigned_id: None,
            acknowledged_at: None,
        });
        table.order.push(id.clone());
        table.entries.insert(id.clone(), entry);
        table.pending.insert(
            mutation_id,
            PendingMutation {
                id: id.clone(),
                group: FieldGroup::Presence,
            },
        );
        table.bump();
        debug!(session_id = %id, mutation_id = %mutation_id, "provisional session inserted");
        Ok(id)
    }

    /// Attach the authority's identifier to a pending add.
    ///
    /// Returns the id the session is currently tracked under. When a poll has
    /// already surfaced the authoritative entry the provisional entry is dropped.
    pub fn confirm_add(&self, mutation_id: MutationId, receipt: &AddReceipt) -> Option<SessionId> {
        let mut table = self.lock();
        if table.closed {
            return None;
        }
        let tracked = table.pending.remove(&mutation_id)?.id;
        let authoritative = SessionId::confirmed(receipt.id.clone());

        if tracked.is_provisional() && table.entries.contains_key(&authoritative) {
            table.evict(&tracked);
            table.bump();
            debug!(session_id = %authoritative, "add confirmed after poll surfaced the session");
            return Some(authoritative);
        }

        let entry = table.entries.get_mut(&tracked)?;
        let Some(pending_add) = entry.pending_add.as_mut() else {
            return Some(tracked);
        };
        pending_add.assigned_id = Some(receipt.id.clone());
        pending_add.acknowledged_at = Some(Instant::now());
        if let Some(name) = receipt.name.as_deref().filter(|name| !name.is_empty()) {
            entry.confirmed.name = name.to_string();
        }
        table.bump();
        debug!(session_id = %tracked, assigned_id = %receipt.id, "add acknowledged");
        Some(tracked)
    }

    /// Mark an optimistic mutation as accepted by the authority.
    ///
    /// Lifecycle overlays stay visible until a poll reflects them or the
    /// grace period lapses. Returns `false` for unknown mutations.
    pub fn confirm(&self, mutation_id: MutationId) -> bool {
        let mut table = self.lock();
        if table.closed {
            return false;
        }
        let Some(pending) = table.pending.remove(&mutation_id) else {
            return false;
        };
        let id = pending.id;
        let Some(entry) = table.entries.get_mut(&id) else {
            return false;
        };
        if let Some(pending_add) = entry
            .pending_add
            .as_mut()
            .filter(|pending_add| pending_add.mutation_id == mutation_id)
        {
            pending_add.acknowledged_at = Some(Instant::now());
            return true;
        }
        match entry.overlays.get_mut(&pending.group) {
            Some(overlay) if overlay.mutation_id == mutation_id => {
                overlay.acknowledged_at = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Revert an optimistic mutation to the last confirmed state of its fields.
    ///
    /// Pending adds lose their provisional session. Returns `false` for unknown mutations.
    pub fn reject(&self, mutation_id: MutationId, reason: impl Display) -> bool {
        let mut table = self.lock();
        if table.closed {
            return false;
        }
        let Some(pending) = table.pending.remove(&mutation_id) else {
            return false;
        };
        let id = pending.id;
        let Some(entry) = table.entries.get_mut(&id) else {
            return false;
        };

        let owns_add = entry
            .pending_add
            .as_ref()
            .is_some_and(|pending_add| pending_add.mutation_id == mutation_id);
        if owns_add {
            table.evict(&id);
            table.bump();
            debug!(session_id = %id, mutation_id = %mutation_id, reason = %reason, "pending add rejected");
            return true;
        }

        let owns_overlay = entry
            .overlays
            .get(&pending.group)
            .is_some_and(|overlay| overlay.mutation_id == mutation_id);
        if owns_overlay {
            entry.overlays.remove(&pending.group);
            table.bump();
            debug!(session_id = %id, mutation_id = %mutation_id, reason = %reason, "optimistic mutation reverted");
        }
        owns_overlay
    }

    /// Merge a freshly polled authoritative snapshot.
    pub fn merge(&self, remote: Vec<TorrentSession>) -> MergeReport {
        self.merge_at(remote, Instant::now())
    }

    /// Merge as of `now`; acknowledged changes older than [`ACK_GRACE`] yield
    /// to the snapshot.
    pub fn merge_at(&self, remote: Vec<TorrentSession>, now: Instant) -> MergeReport {
        let mut table = self.lock();
        if table.closed {
            return MergeReport::default();
        }
        let report = reconcile::merge(&mut table, remote, self.prune, now);
        if report.changed() {
            table.bump();
        }
        report
    }
}
