//! Background task runner
//!
//! Slow work (image generation, speech, notifications) runs on spawned tokio
//! tasks tracked in an arena keyed by [`TaskId`]. The controller only holds
//! [`TaskHandle`]s. Cancellation is cooperative: tasks call
//! [`TaskContext::checkpoint`] between stages and stop there once cancelled.

use crate::error::{BuddyError, BuddyResult};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Monotonic task id; a higher id was submitted later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    ImageGeneration,
    SpeechSynthesis,
    Notification,
}

/// Value left in a task's result slot
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// `shown` is false when the display was skipped or failed
    Image {
        path: PathBuf,
        prompt: String,
        shown: bool,
    },
    Spoken,
    Notified,
    Nothing,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Finished(TaskOutput),
    Cancelled,
    Failed(String),
}

/// Given to the task body
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    kind: TaskKind,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop here if cancellation was requested
    pub fn checkpoint(&self, stage: &str) -> BuddyResult<()> {
        if self.cancel.is_cancelled() {
            debug!("Task {} stopping at checkpoint '{}'", self.id, stage);
            return Err(BuddyError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Controller-side reference to a running task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    kind: TaskKind,
    cancel: CancellationToken,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

struct TaskEntry {
    kind: TaskKind,
    started_at: Instant,
    cancel: CancellationToken,
    join: JoinHandle<TaskStatus>,
}

/// A task that has left the arena
#[derive(Debug, Clone)]
pub struct FinishedTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

/// Outcome of [`TaskRunner::join_all`]
#[derive(Debug, Default)]
pub struct JoinReport {
    pub completed: Vec<FinishedTask>,
    pub abandoned: Vec<TaskId>,
}

impl JoinReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty()
    }
}

#[derive(Default)]
pub struct TaskRunner {
    next_id: u64,
    tasks: HashMap<TaskId, TaskEntry>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ids of tracked tasks, oldest first
    pub fn active(&self) -> Vec<(TaskId, TaskKind)> {
        let mut ids: Vec<(TaskId, TaskKind)> =
            self.tasks.iter().map(|(id, e)| (*id, e.kind)).collect();
        ids.sort_by_key(|(id, _)| *id);
        ids
    }

    /// Start `work` on the runtime and return immediately
    pub fn submit<F, Fut>(&mut self, kind: TaskKind, work: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = BuddyResult<TaskOutput>> + Send + 'static,
    {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        let cancel = CancellationToken::new();
        let ctx = TaskContext {
            id,
            kind,
            cancel: cancel.clone(),
        };

        let body = work(ctx);
        let join = tokio::spawn(async move {
            match body.await {
                Ok(output) => {
                    debug!("✅ Task {} ({:?}) finished", id, kind);
                    TaskStatus::Finished(output)
                }
                Err(BuddyError::Cancelled) => {
                    info!("🛑 Task {} ({:?}) cancelled", id, kind);
                    TaskStatus::Cancelled
                }
                Err(e) => {
                    warn!("❌ Task {} ({:?}) failed: {}", id, kind, e);
                    TaskStatus::Failed(e.to_string())
                }
            }
        });

        self.tasks.insert(
            id,
            TaskEntry {
                kind,
                started_at: Instant::now(),
                cancel: cancel.clone(),
                join,
            },
        );
        info!("🚀 Started task {} ({:?})", id, kind);

        TaskHandle { id, kind, cancel }
    }

    /// Request cooperative cancellation. Returns whether the task was still tracked.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        handle.cancel.cancel();
        self.tasks.contains_key(&handle.id)
    }

    pub fn cancel_all(&self) {
        for (id, entry) in &self.tasks {
            debug!("Cancelling task {} ({:?})", id, entry.kind);
            entry.cancel.cancel();
        }
    }

    /// Remove and return every task that has already ended, without waiting
    pub async fn reap(&mut self) -> Vec<FinishedTask> {
        let mut done: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, e)| e.join.is_finished())
            .map(|(id, _)| *id)
            .collect();
        done.sort();

        let mut finished = Vec::with_capacity(done.len());
        for id in done {
            if let Some(entry) = self.tasks.remove(&id) {
                let elapsed = entry.started_at.elapsed();
                let status = match entry.join.await {
                    Ok(status) => status,
                    Err(e) => TaskStatus::Failed(format!("task panicked: {}", e)),
                };
                finished.push(FinishedTask {
                    id,
                    kind: entry.kind,
                    status,
                    elapsed,
                });
            }
        }
        finished
    }

    /// Wait for every tracked task until `deadline`. Tasks still running at
    /// the deadline are aborted and reported as abandoned.
    pub async fn join_all(&mut self, deadline: Instant) -> JoinReport {
        let mut entries: Vec<(TaskId, TaskEntry)> = self.tasks.drain().collect();
        entries.sort_by_key(|(id, _)| *id);

        let mut report = JoinReport::default();
        for (id, mut entry) in entries {
            match tokio::time::timeout_at(deadline, &mut entry.join).await {
                Ok(result) => {
                    let status = match result {
                        Ok(status) => status,
                        Err(e) => TaskStatus::Failed(format!("task panicked: {}", e)),
                    };
                    report.completed.push(FinishedTask {
                        id,
                        kind: entry.kind,
                        status,
                        elapsed: entry.started_at.elapsed(),
                    });
                }
                Err(_) => {
                    warn!(
                        "⏰ Task {} ({:?}) did not finish in time, abandoning it",
                        id, entry.kind
                    );
                    entry.cancel.cancel();
                    entry.join.abort();
                    report.abandoned.push(id);
                }
            }
        }
        report
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        for entry in self.tasks.values() {
            entry.cancel.cancel();
        }
    }
}
