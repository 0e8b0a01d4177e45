//! Programmable in-memory gateway.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use seedline_core::{
    AddReceipt, GatewayError, GatewayResult, RemoteGateway, TorrentSession, TorrentSource,
};
use tokio::sync::Semaphore;

/// Gateway operation, used to script results and hold calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    /// `add`
    Add,
    /// `list`
    List,
    /// `remove`
    Remove,
    /// `pause`
    Pause,
    /// `resume`
    Resume,
    /// `open_downloads_folder`
    OpenDownloads,
    /// `downloads_path`
    DownloadsPath,
}

/// Call recorded by [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `add(source)`
    Add(TorrentSource),
    /// `list()`
    List,
    /// `remove(id, delete_files)`
    Remove {
        /// Target id.
        id: String,
        /// Whether payload deletion was requested.
        delete_files: bool,
    },
    /// `pause(id)`
    Pause(String),
    /// `resume(id)`
    Resume(String),
    /// `open_downloads_folder()`
    OpenDownloads,
    /// `downloads_path()`
    DownloadsPath,
}

impl GatewayCall {
    /// Operation the call belongs to.
    #[must_use]
    pub const fn op(&self) -> GatewayOp {
        match self {
            Self::Add(_) => GatewayOp::Add,
            Self::List => GatewayOp::List,
            Self::Remove { .. } => GatewayOp::Remove,
            Self::Pause(_) => GatewayOp::Pause,
            Self::Resume(_) => GatewayOp::Resume,
            Self::OpenDownloads => GatewayOp::OpenDownloads,
            Self::DownloadsPath => GatewayOp::DownloadsPath,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    sessions: Vec<TorrentSession>,
    list_results: VecDeque<GatewayResult<Vec<TorrentSession>>>,
    add_results: VecDeque<GatewayResult<AddReceipt>>,
    unit_results: HashMap<GatewayOp, VecDeque<GatewayResult<()>>>,
    calls: Vec<GatewayCall>,
    gates: HashMap<GatewayOp, Arc<Semaphore>>,
    delays: HashMap<GatewayOp, Duration>,
}

/// In-memory [`RemoteGateway`] with scripted responses.
///
/// `list` answers queued results first and then the standing session set.
/// Mutations succeed unless a result was queued for their operation. A held
/// operation blocks every call until [`ScriptedGateway::release`] lets it through.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    /// Gateway reporting no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose standing snapshot is `sessions`.
    #[must_use]
    pub fn with_sessions(sessions: Vec<TorrentSession>) -> Self {
        let gateway = Self::new();
        gateway.set_sessions(sessions);
        gateway
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the standing snapshot.
    pub fn set_sessions(&self, sessions: Vec<TorrentSession>) {
        self.script().sessions = sessions;
    }

    /// Queue a one-off `list` result.
    pub fn push_list(&self, result: GatewayResult<Vec<TorrentSession>>) {
        self.script().list_results.push_back(result);
    }

    /// Queue an `add` result.
    pub fn push_add(&self, result: GatewayResult<AddReceipt>) {
        self.script().add_results.push_back(result);
    }

    /// Queue a result for a unit-returning operation.
    pub fn push_result(&self, op: GatewayOp, result: GatewayResult<()>) {
        self.script()
            .unit_results
            .entry(op)
            .or_default()
            .push_back(result);
    }

    /// Make every call of `op` sleep for `delay` before answering.
    pub fn delay(&self, op: GatewayOp, delay: Duration) {
        self.script().delays.insert(op, delay);
    }

    /// Block calls of `op` until released.
    pub fn hold(&self, op: GatewayOp) {
        self.script()
            .gates
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held calls of `op` proceed.
    pub fn release(&self, op: GatewayOp, count: usize) {
        if let Some(gate) = self.script().gates.get(&op) {
            gate.add_permits(count);
        }
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.script().calls.clone()
    }

    /// Number of calls recorded for `op`.
    #[must_use]
    pub fn count(&self, op: GatewayOp) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    /// Yield until at least `count` calls of `op` have been recorded.
    pub async fn wait_for(&self, op: GatewayOp, count: usize) {
        while self.count(op) < count {
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn enter(&self, call: GatewayCall) {
        let op = call.op();
        let (gate, delay) = {
            let mut script = self.script();
            script.calls.push(call);
            (script.gates.get(&op).cloned(), script.delays.get(&op).copied())
        };
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn unit_result(&self, op: GatewayOp) -> GatewayResult<()> {
        self.script()
            .unit_results
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    async fn add(&self, source: TorrentSource) -> GatewayResult<AddReceipt> {
        self.enter(GatewayCall::Add(source)).await;
        self.script()
            .add_results
            .pop_front()
            .unwrap_or_else(|| {
                Err(GatewayError::Unexpected {
                    operation: "add",
                    detail: "no scripted add result".to_string(),
                })
            })
    }

    async fn list(&self) -> GatewayResult<Vec<TorrentSession>> {
        self.enter(GatewayCall::List).await;
        let mut script = self.script();
        script
            .list_results
            .pop_front()
            .unwrap_or_else(|| Ok(script.sessions.clone()))
    }

    async fn remove(&self, id: &str, delete_files: bool) -> GatewayResult<()> {
        self.enter(GatewayCall::Remove {
            id: id.to_string(),
            delete_files,
        })
        .await;
        self.unit_result(GatewayOp::Remove)
    }

    async fn pause(&self, id: &str) -> GatewayResult<()> {
        self.enter(GatewayCall::Pause(id.to_string())).await;
        self.unit_result(GatewayOp::Pause)
    }

    async fn resume(&self, id: &str) -> GatewayResult<()> {
        self.enter(GatewayCall::Resume(id.to_string())).await;
        self.unit_result(GatewayOp::Resume)
    }

    async fn open_downloads_folder(&self) -> GatewayResult<()> {
        self.enter(GatewayCall::OpenDownloads).await;
        self.unit_result(GatewayOp::OpenDownloads)
    }

    async fn downloads_path(&self) -> GatewayResult<String> {
        self.enter(GatewayCall::DownloadsPath).await;
        self.unit_result(GatewayOp::DownloadsPath)
            .map(|()| "/tmp/downloads".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::seeding;

    #[tokio::test]
    async fn queued_list_results_come_first() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::with_sessions(vec![seeding("a")]);
        gateway.push_list(Err(GatewayError::unavailable("list", "down")));
        assert!(gateway.list().await.is_err());
        assert_eq!(gateway.list().await?.len(), 1);
        assert_eq!(gateway.count(GatewayOp::List), 2);
        Ok(())
    }

    #[tokio::test]
    async fn held_calls_wait_for_release() -> anyhow::Result<()> {
        let gateway = ScriptedGateway::new();
        gateway.hold(GatewayOp::Pause);
        let task = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.pause("t1").await })
        };
        gateway.wait_for(GatewayOp::Pause, 1).await;
        assert!(!task.is_finished());
        gateway.release(GatewayOp::Pause, 1);
        task.await??;
        assert_eq!(gateway.calls(), vec![GatewayCall::Pause("t1".into())]);
        Ok(())
    }
}
