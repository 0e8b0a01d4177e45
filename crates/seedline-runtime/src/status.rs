//! Timed status messages shown while a slow call is pending.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Ordered `(delay, message)` steps; each delay is measured from the previous step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSchedule {
    steps: Vec<(Duration, String)>,
}

impl StatusSchedule {
    /// Build a schedule from explicit steps.
    #[must_use]
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = (Duration, S)>,
        S: Into<String>,
    {
        Self {
            steps: steps
                .into_iter()
                .map(|(delay, message)| (delay, message.into()))
                .collect(),
        }
    }

    /// Messages shown while an add waits on the backend.
    #[must_use]
    pub fn for_add() -> Self {
        Self::new([
            (Duration::ZERO, "Adding torrent..."),
            (Duration::from_secs(2), "Fetching metadata..."),
            (Duration::from_secs(8), "Still waiting for peers..."),
            (Duration::from_secs(20), "This is taking longer than usual..."),
        ])
    }

    /// Steps in order.
    #[must_use]
    pub fn steps(&self) -> &[(Duration, String)] {
        &self.steps
    }

    /// Run the schedule on a background task, calling `emit` for each message.
    ///
    /// Dropping or aborting the returned handle cancels every remaining step.
    #[must_use]
    pub fn start<F>(&self, emit: F) -> StatusHandle
    where
        F: Fn(&str) + Send + 'static,
    {
        let steps = self.steps.clone();
        let task = tokio::spawn(async move {
            for (delay, message) in steps {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                emit(&message);
            }
        });
        StatusHandle { task }
    }
}

/// Running schedule.
#[derive(Debug)]
pub struct StatusHandle {
    task: JoinHandle<()>,
}

impl StatusHandle {
    /// Cancel the remaining steps.
    pub fn abort(self) {
        drop(self);
    }

    /// Whether every step has already been emitted or the schedule was cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StatusHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
