//! Engine owning the session store, the gateway, the poll loop, and the event bus.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use seedline_core::{
    AddReceipt, Cadence, FieldGroup, GatewayError, MagnetLink, MutationId, PruneRule,
    RemoteGateway, SessionId, SessionPatch, SessionStore, StoreError, TorrentSession,
    TorrentSource, classify, next_interval,
};
use seedline_events::{Connectivity, EngineEvent, EventBus, EventStream};
use tokio::sync::{Mutex as AsyncMutex, Notify, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ControlError, ControlResult};
use crate::scheduler::PollScheduler;
use crate::status::StatusSchedule;

const DUPLICATE_MESSAGE: &str = "Torrent already exists";

/// Tunables for [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Fast and slow poll intervals.
    pub cadence: Cadence,
    /// Absence rule applied on merge.
    pub prune: PruneRule,
    /// Capacity of the event bus replay ring.
    pub event_capacity: usize,
    /// Status messages emitted while an add is pending.
    pub add_status: StatusSchedule,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cadence: Cadence::default(),
            prune: PruneRule::default(),
            event_capacity: 256,
            add_status: StatusSchedule::for_add(),
        }
    }
}

/// Successful add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Id the session is tracked under right now; provisional until a poll observes it.
    pub session_id: SessionId,
    /// Authority response.
    pub receipt: AddReceipt,
}

#[derive(Debug, Default)]
struct CallTracker {
    active: AtomicUsize,
    idle: Notify,
}

struct CallGuard<'a> {
    tracker: &'a CallTracker,
}

impl CallTracker {
    fn enter(&self) -> CallGuard<'_> {
        self.active.fetch_add(1, Ordering::AcqRel);
        CallGuard { tracker: self }
    }

    async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// State shared between control calls and the poll loop.
pub(crate) struct Shared {
    gateway: Arc<dyn RemoteGateway>,
    store: SessionStore,
    events: EventBus,
    connectivity: watch::Sender<Connectivity>,
    shutdown: watch::Sender<bool>,
    calls: CallTracker,
    fetch: AsyncMutex<()>,
    options: EngineOptions,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Shared")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Shared {
    pub(crate) const fn cadence(&self) -> Cadence {
        self.options.cadence
    }

    /// Fetch one snapshot and merge it; returns the interval until the next poll.
    ///
    /// At most one list call is in flight per engine. A caller arriving while
    /// another fetch runs waits for it and shares its outcome instead of
    /// issuing a second request.
    pub(crate) async fn poll(&self) -> Result<Duration, GatewayError> {
        let Ok(_fetch) = self.fetch.try_lock() else {
            debug!("fetch already in flight; joining it");
            drop(self.fetch.lock().await);
            return self.settled_poll();
        };
        match self.gateway.list().await {
            Ok(snapshot) => {
                let report = self.store.merge(snapshot);
                let sessions = self.store.snapshot();
                if report.changed() {
                    debug!(
                        added = report.added,
                        updated = report.updated,
                        pruned = report.pruned,
                        promoted = report.promoted,
                        "snapshot merged"
                    );
                    self.publish_snapshot(sessions.len());
                }
                self.mark_online();
                Ok(next_interval(self.options.cadence, &sessions))
            }
            Err(err) => {
                self.mark_reconnecting(&err);
                Err(err)
            }
        }
    }

    /// Whether a list call is running right now.
    pub(crate) fn is_fetching(&self) -> bool {
        self.fetch.try_lock().is_err()
    }

    /// Outcome of the fetch that just finished, read back from the store and
    /// the connectivity state it left behind.
    fn settled_poll(&self) -> Result<Duration, GatewayError> {
        match &*self.connectivity.borrow() {
            Connectivity::Online => {
                Ok(next_interval(self.options.cadence, &self.store.snapshot()))
            }
            Connectivity::Reconnecting { detail, .. } => {
                Err(GatewayError::unavailable("list", detail.clone()))
            }
        }
    }

    fn publish_snapshot(&self, sessions: usize) {
        self.events.publish(EngineEvent::SnapshotChanged {
            revision: self.store.revision(),
            sessions,
        });
    }

    fn mark_online(&self) {
        let changed = self.connectivity.send_if_modified(|current| {
            if current.is_reconnecting() {
                *current = Connectivity::Online;
                true
            } else {
                false
            }
        });
        if changed {
            info!("torrent service reachable again");
            self.events.publish(EngineEvent::ConnectivityChanged {
                connectivity: Connectivity::Online,
            });
        }
    }

    fn mark_reconnecting(&self, error: &GatewayError) {
        let detail = error.to_string();
        let mut entered = false;
        self.connectivity.send_modify(|current| {
            let failures = match current {
                Connectivity::Online => {
                    entered = true;
                    1
                }
                Connectivity::Reconnecting { failures, .. } => failures.saturating_add(1),
            };
            *current = Connectivity::Reconnecting {
                failures,
                detail: detail.clone(),
            };
        });
        if entered {
            warn!(error = %detail, kind = %classify(error), "poll failed; keeping cached sessions");
            self.events.publish(EngineEvent::ConnectivityChanged {
                connectivity: self.connectivity.borrow().clone(),
            });
        } else {
            debug!(error = %detail, "poll failed again");
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run a gateway future unless the engine shuts down first.
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> ControlResult<T>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        if self.is_shutting_down() {
            return Err(ControlError::Cancelled { operation });
        }
        let _guard = self.calls.enter();
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopping| *stopping) => Err(ControlError::Cancelled { operation }),
            result = call => result.map_err(ControlError::from),
        }
    }
}

/// Owner of the sync machinery; create one per UI context and dispose it with [`SyncEngine::shutdown`].
#[derive(Debug)]
pub struct SyncEngine {
    shared: Arc<Shared>,
    scheduler: Mutex<Option<PollScheduler>>,
}

impl SyncEngine {
    /// Build an engine around `gateway`; polling starts with [`SyncEngine::start`].
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>, options: EngineOptions) -> Self {
        let (connectivity, _) = watch::channel(Connectivity::Online);
        let (shutdown, _) = watch::channel(false);
        let shared = Shared {
            gateway,
            store: SessionStore::new(options.prune),
            events: EventBus::with_capacity(options.event_capacity),
            connectivity,
            shutdown,
            calls: CallTracker::default(),
            fetch: AsyncMutex::new(()),
            options,
        };
        Self {
            shared: Arc::new(shared),
            scheduler: Mutex::new(None),
        }
    }

    fn scheduler(&self) -> MutexGuard<'_, Option<PollScheduler>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the poll loop; a no-op when it is already running or the engine is shutting down.
    pub fn start(&self) {
        if self.shared.is_shutting_down() {
            return;
        }
        let mut scheduler = self.scheduler();
        if scheduler.is_none() {
            info!(
                fast = ?self.shared.options.cadence.fast,
                slow = ?self.shared.options.cadence.slow,
                "starting poll loop"
            );
            *scheduler = Some(PollScheduler::start(Arc::clone(&self.shared)));
        }
    }

    /// Stop the poll loop and wait for it to exit. The store and control calls stay usable.
    pub async fn stop_polling(&self) {
        let scheduler = self.scheduler().take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
    }

    /// Whether the poll loop is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.scheduler().is_some()
    }

    /// Ask the poll loop for an immediate fetch.
    pub fn refresh(&self) {
        if let Some(scheduler) = self.scheduler().as_ref() {
            scheduler.refresh();
        }
    }

    /// Fetch and merge one snapshot outside the poll loop.
    ///
    /// Shares the poll loop's single-flight guard: when a fetch is already
    /// running this waits for it instead of issuing another list call.
    ///
    /// # Errors
    ///
    /// Returns the classified gateway failure; connectivity is updated either way.
    pub async fn poll_once(&self) -> ControlResult<Duration> {
        let shared = &self.shared;
        shared.guarded("list", shared.poll()).await
    }

    /// Ordered view of every visible session.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TorrentSession> {
        self.shared.store.snapshot()
    }

    /// View of one session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<TorrentSession> {
        self.shared.store.get(id)
    }

    /// Store revision, bumped on every observable change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.shared.store.revision()
    }

    /// Current reachability of the authority.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.shared.connectivity.borrow().clone()
    }

    /// Receiver notified whenever reachability changes.
    #[must_use]
    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.shared.connectivity.subscribe()
    }

    /// Subscribe to engine events, replaying those newer than `since`.
    #[must_use]
    pub fn subscribe(&self, since: Option<u64>) -> EventStream {
        self.shared.events.subscribe(since)
    }

    /// Underlying session store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.shared.store
    }

    /// Add a torrent, showing a provisional session until a poll confirms it.
    ///
    /// Magnet links are validated and checked against tracked sessions before
    /// anything is recorded, so validation and duplicate failures leave the
    /// store untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Gateway`] for validation, duplicate, timeout and
    /// connectivity failures, and [`ControlError::Cancelled`] on shutdown.
    pub async fn add(&self, source: TorrentSource) -> ControlResult<AddOutcome> {
        let shared = &self.shared;
        let (name, dedup_key) = provisional_identity(&source)?;
        if let Some(existing) = dedup_key
            .as_deref()
            .and_then(|key| shared.store.find_by_dedup_key(key))
        {
            debug!(session_id = %existing, "add refused locally as duplicate");
            return Err(GatewayError::duplicate(DUPLICATE_MESSAGE).into());
        }

        let mutation_id = MutationId::new();
        let provisional = match shared.store.insert_provisional(name, dedup_key, mutation_id) {
            Ok(id) => id,
            Err(StoreError::Conflict {
                group: FieldGroup::Presence,
                ..
            }) => return Err(GatewayError::duplicate(DUPLICATE_MESSAGE).into()),
            Err(StoreError::Closed) => return Err(ControlError::Cancelled { operation: "add" }),
            Err(other) => return Err(other.into()),
        };
        shared.publish_snapshot(shared.store.snapshot().len());

        let request_id = Uuid::new_v4();
        let events = shared.events.clone();
        let status = shared.options.add_status.start(move |message| {
            events.publish(EngineEvent::AddProgress {
                request_id,
                message: message.to_string(),
            });
        });

        let result = shared.guarded("add", shared.gateway.add(source)).await;
        status.abort();

        match result {
            Ok(receipt) => {
                let session_id = shared
                    .store
                    .confirm_add(mutation_id, &receipt)
                    .unwrap_or_else(|| SessionId::confirmed(receipt.id.clone()));
                info!(session_id = %session_id, assigned_id = %receipt.id, "torrent added");
                shared.events.publish(EngineEvent::AddSettled {
                    request_id,
                    session_id: Some(receipt.id.clone()),
                    error: None,
                });
                shared.publish_snapshot(shared.store.snapshot().len());
                self.refresh();
                Ok(AddOutcome {
                    session_id,
                    receipt,
                })
            }
            Err(err) => {
                if shared.store.reject(mutation_id, &err) {
                    shared.publish_snapshot(shared.store.snapshot().len());
                }
                warn!(session_id = %provisional, error = %err, "add failed");
                shared.events.publish(EngineEvent::AddSettled {
                    request_id,
                    session_id: None,
                    error: err.kind(),
                });
                Err(err)
            }
        }
    }

    /// Pause a session; shows `Paused` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Store`] when the session is unknown, provisional
    /// or already has a lifecycle change in flight, and [`ControlError::Gateway`]
    /// when the authority rejects the command (the optimistic state is reverted).
    pub async fn pause(&self, id: &SessionId) -> ControlResult<()> {
        self.mutate(id, Command::Pause).await
    }

    /// Resume a session; shows `Downloading` (or `Seeding` when complete) immediately.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::pause`].
    pub async fn resume(&self, id: &SessionId) -> ControlResult<()> {
        self.mutate(id, Command::Resume).await
    }

    /// Remove a session, hiding it immediately.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::pause`], with the removal tracked in its own field group.
    pub async fn remove(&self, id: &SessionId, delete_files: bool) -> ControlResult<()> {
        self.mutate(id, Command::Remove { delete_files }).await
    }

    async fn mutate(&self, id: &SessionId, command: Command) -> ControlResult<()> {
        let shared = &self.shared;
        let operation = command.operation();
        let remote_id = id
            .as_confirmed()
            .ok_or_else(|| StoreError::ProvisionalSession { id: id.clone() })?;
        let patch = command.patch(&shared.store, id)?;
        let mutation_id = MutationId::new();
        shared.store.apply_optimistic(id, patch, mutation_id)?;
        shared.publish_snapshot(shared.store.snapshot().len());
        debug!(session_id = %id, mutation_id = %mutation_id, operation, "optimistic change applied");

        let call = async {
            match command {
                Command::Pause => shared.gateway.pause(remote_id).await,
                Command::Resume => shared.gateway.resume(remote_id).await,
                Command::Remove { delete_files } => {
                    shared.gateway.remove(remote_id, delete_files).await
                }
            }
        };
        match shared.guarded(operation, call).await {
            Ok(()) => {
                shared.store.confirm(mutation_id);
                Ok(())
            }
            Err(err) => {
                if shared.store.reject(mutation_id, &err) {
                    shared.publish_snapshot(shared.store.snapshot().len());
                }
                if let Some(kind) = err.kind() {
                    shared.events.publish(EngineEvent::MutationRejected {
                        session_id: id.to_string(),
                        operation: operation.to_string(),
                        kind,
                        message: err.to_string(),
                    });
                }
                warn!(session_id = %id, operation, error = %err, "control command failed");
                Err(err)
            }
        }
    }

    /// Ask the authority to reveal its download folder.
    ///
    /// # Errors
    ///
    /// Returns the classified gateway failure.
    pub async fn open_downloads_folder(&self) -> ControlResult<()> {
        let shared = &self.shared;
        shared
            .guarded("open_downloads_folder", shared.gateway.open_downloads_folder())
            .await
    }

    /// Download folder used by the authority.
    ///
    /// # Errors
    ///
    /// Returns the classified gateway failure.
    pub async fn downloads_path(&self) -> ControlResult<String> {
        let shared = &self.shared;
        shared
            .guarded("downloads_path", shared.gateway.downloads_path())
            .await
    }

    /// Stop polling, abandon in-flight commands, close the store, and wait for
    /// every in-flight command to return.
    pub async fn shutdown(&self) {
        self.stop_polling().await;
        let _ = self.shared.shutdown.send_replace(true);
        self.shared.store.close();
        self.shared.calls.drained().await;
        info!("sync engine shut down");
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Pause,
    Resume,
    Remove { delete_files: bool },
}

impl Command {
    const fn operation(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Remove { .. } => "remove",
        }
    }

    fn patch(self, store: &SessionStore, id: &SessionId) -> Result<SessionPatch, StoreError> {
        match self {
            Self::Pause => Ok(SessionPatch::pause()),
            Self::Resume => store
                .get(id)
                .map(|current| SessionPatch::resume(&current))
                .ok_or_else(|| StoreError::UnknownSession { id: id.clone() }),
            Self::Remove { .. } => Ok(SessionPatch::Removal),
        }
    }
}

fn provisional_identity(source: &TorrentSource) -> ControlResult<(String, Option<String>)> {
    match source {
        TorrentSource::Magnet { uri } => {
            let link = MagnetLink::parse(uri)?;
            Ok((link.provisional_name(), Some(link.info_hash().to_string())))
        }
        TorrentSource::File { path } => Ok((display_name(path)?, None)),
    }
}

fn display_name(path: &Path) -> ControlResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            GatewayError::invalid(format!("'{}' is not a torrent file path", path.display())).into()
        })
}
