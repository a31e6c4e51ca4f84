//! Explicit handles to every running task and their ordered, bounded shutdown.

use crate::error::DaqError;
use crate::pipeline::flusher::FlusherStats;
use crate::pipeline::poller::PollerStats;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, warn};

/// Statistics collected from joined tasks. A task that failed to join has no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Flusher counters
    pub flusher: Option<FlusherStats>,
    /// Poller counters by source name, in start order
    pub pollers: Vec<(String, PollerStats)>,
    /// Heartbeat toggles
    pub heartbeat_toggles: Option<u64>,
}

/// Owns the join handles of the pipeline's tasks.
#[derive(Default)]
pub struct Supervisor {
    flusher: Option<JoinHandle<FlusherStats>>,
    pollers: Vec<(String, JoinHandle<PollerStats>)>,
    heartbeat: Option<JoinHandle<u64>>,
}

impl Supervisor {
    /// Create a supervisor with no tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the flusher task.
    pub fn set_flusher(&mut self, handle: JoinHandle<FlusherStats>) {
        self.flusher = Some(handle);
    }

    /// Track a poller task.
    pub fn add_poller(&mut self, source: impl Into<String>, handle: JoinHandle<PollerStats>) {
        self.pollers.push((source.into(), handle));
    }

    /// Track the heartbeat task.
    pub fn set_heartbeat(&mut self, handle: JoinHandle<u64>) {
        self.heartbeat = Some(handle);
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        usize::from(self.flusher.is_some())
            + self.pollers.len()
            + usize::from(self.heartbeat.is_some())
    }

    /// Whether no task is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Join flusher, then pollers, then heartbeat, each bounded by `join_timeout`.
    ///
    /// The run flag must already be cleared. A task that does not finish in time is
    /// aborted and reported; the remaining tasks are still joined.
    pub async fn shutdown(&mut self, join_timeout: Duration) -> (TaskReport, Vec<DaqError>) {
        let mut report = TaskReport::default();
        let mut errors = Vec::new();

        if let Some(handle) = self.flusher.take() {
            match join_bounded("flusher", handle, join_timeout).await {
                Ok(stats) => report.flusher = Some(stats),
                Err(e) => errors.push(e),
            }
        }

        for (source, handle) in self.pollers.drain(..) {
            let task = format!("poller:{source}");
            match join_bounded(&task, handle, join_timeout).await {
                Ok(stats) => report.pollers.push((source, stats)),
                Err(e) => errors.push(e),
            }
        }

        if let Some(handle) = self.heartbeat.take() {
            match join_bounded("heartbeat", handle, join_timeout).await {
                Ok(toggles) => report.heartbeat_toggles = Some(toggles),
                Err(e) => errors.push(e),
            }
        }

        (report, errors)
    }
}

async fn join_bounded<T>(
    task: &str,
    mut handle: JoinHandle<T>,
    join_timeout: Duration,
) -> Result<T, DaqError> {
    match timeout(join_timeout, &mut handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(task, error = %e, "Task failed");
            Err(DaqError::TaskJoin {
                task: task.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            handle.abort();
            warn!(task, ?join_timeout, "Task did not stop in time; aborted");
            Err(DaqError::JoinTimeout(task.to_string()))
        }
    }
}
