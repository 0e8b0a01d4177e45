//! Cooperative poll loop.
//!
//! One task owns the timer. It never runs two fetches at once: the next
//! deadline is computed only after the previous fetch finished, so ticks that
//! fall due meanwhile are skipped rather than queued. Fetches started through
//! `SyncEngine::poll_once` share the same guard.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::Shared;

/// Handle to a running poll loop.
#[derive(Debug)]
pub struct PollScheduler {
    stop: watch::Sender<bool>,
    refresh: Arc<Notify>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Spawn the loop; the first poll runs immediately.
    pub(crate) fn start(shared: Arc<Shared>) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(run(Arc::clone(&shared), stop_rx, Arc::clone(&refresh)));
        Self {
            stop,
            refresh,
            shared,
            task: Some(task),
        }
    }

    /// Request an immediate poll; dropped when a fetch is already in flight.
    pub fn refresh(&self) {
        if self.shared.is_fetching() {
            debug!("refresh dropped while a fetch is in flight");
            return;
        }
        self.refresh.notify_one();
    }

    /// Whether a fetch is currently running.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.shared.is_fetching()
    }

    /// Cancel the timer and any in-flight fetch, then wait for the loop to exit.
    pub async fn stop(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "poll loop terminated abnormally");
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
    refresh: Arc<Notify>,
) {
    let mut interval = shared.cadence().slow;
    let mut deadline = Instant::now();
    debug!("poll loop started");

    loop {
        tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => break,
            () = tokio::time::sleep_until(deadline) => {}
            () = refresh.notified() => debug!("poll requested"),
        }

        let outcome = tokio::select! {
            biased;
            _ = stop.wait_for(|stopped| *stopped) => None,
            outcome = shared.poll() => Some(outcome),
        };

        let Some(outcome) = outcome else {
            debug!("in-flight fetch cancelled");
            break;
        };
        if let Ok(next) = outcome {
            if next != interval {
                debug!(interval_ms = duration_ms(next), "poll interval changed");
            }
            interval = next;
        }
        deadline = Instant::now() + interval;
    }
    debug!("poll loop stopped");
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
