#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! Event stream surfaced by the sync engine.
//!
//! Events carry sequential identifiers and a short replay ring so a late
//! subscriber (for example a CLI watcher attaching after start-up) can catch up.
//! Delivery uses `tokio::broadcast`; when a subscriber lags, the oldest events
//! are dropped for that subscriber only.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use seedline_core::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each emitted event.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Reachability of the remote authority as observed by the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Connectivity {
    /// The last poll succeeded.
    #[default]
    Online,
    /// One or more consecutive polls failed; cached sessions are retained.
    Reconnecting {
        /// Consecutive failed polls.
        failures: u32,
        /// Most recent failure detail.
        detail: String,
    },
}

impl Connectivity {
    /// Whether a reconnecting condition is standing.
    #[must_use]
    pub const fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

/// Typed events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The session store changed observably.
    SnapshotChanged {
        /// Store revision after the change.
        revision: u64,
        /// Number of visible sessions.
        sessions: usize,
    },
    /// Reachability of the authority changed.
    ConnectivityChanged {
        /// New condition.
        connectivity: Connectivity,
    },
    /// An optimistic mutation was reverted.
    MutationRejected {
        /// Session the mutation targeted.
        session_id: String,
        /// Operation name.
        operation: String,
        /// Failure category.
        kind: ErrorKind,
        /// Message surfaced to the user.
        message: String,
    },
    /// Progressive status for a pending add.
    AddProgress {
        /// Correlates every status line of one add.
        request_id: Uuid,
        /// Status line.
        message: String,
    },
    /// A pending add resolved.
    AddSettled {
        /// Correlates with earlier [`EngineEvent::AddProgress`] events.
        request_id: Uuid,
        /// Authority-assigned id on success.
        session_id: Option<String>,
        /// Failure category on error.
        error: Option<ErrorKind>,
    },
}

impl EngineEvent {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SnapshotChanged { .. } => "snapshot_changed",
            Self::ConnectivityChanged { .. } => "connectivity_changed",
            Self::MutationRejected { .. } => "mutation_rejected",
            Self::AddProgress { .. } => "add_progress",
            Self::AddSettled { .. } => "add_settled",
        }
    }
}

/// Event plus its identifier and emission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: EngineEvent,
}

/// Shared event bus built on `tokio::broadcast`.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a bus whose channel and replay ring hold `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish an event, returning its identifier.
    pub fn publish(&self, event: EngineEvent) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        {
            let mut replay = self.lock_replay();
            if replay.len() == self.replay_capacity {
                replay.pop_front();
            }
            replay.push_back(envelope.clone());
        }
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe, replaying buffered events newer than `since_id` first.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let replay = self.lock_replay();
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            replay.iter().filter(|item| item.id > since).cloned().collect()
        });
        let receiver = self.sender.subscribe();
        drop(replay);
        EventStream { backlog, receiver }
    }

    /// Identifier of the most recent event, if any.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding replayed events before live ones.
#[derive(Debug)]
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Next event; `None` once the bus is dropped.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
