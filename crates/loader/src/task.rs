//! Worker task lifecycle

use lumen_core::{CacheKey, Locator};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Lifecycle of a worker task
///
/// ```text
/// Pending -> Running -> { Completed, Failed, Cancelled }
/// Pending -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    /// Queued, waiting for a pool slot
    Pending,
    /// Holding a slot: cache lookup, decode, delivery
    Running,
    /// Delivered an image to every attached receiver
    Completed,
    /// Decode failed; every attached receiver got an absence
    Failed,
    /// Every receiver detached, or the pool shut down first
    Cancelled,
}

impl TaskState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub const fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One unit of work for one key
pub struct WorkerTask {
    id: TaskId,
    key: CacheKey,
    locator: Locator,
    state: watch::Sender<TaskState>,
}

impl WorkerTask {
    pub(crate) fn new(key: CacheKey, locator: Locator) -> Self {
        Self::with_state(key, locator, TaskState::Pending)
    }

    /// A task that never ran, for locators rejected up front
    pub(crate) fn rejected(key: CacheKey, locator: Locator) -> Self {
        Self::with_state(key, locator, TaskState::Failed)
    }

    fn with_state(key: CacheKey, locator: Locator, initial: TaskState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
            key,
            locator,
            state,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Wait for a terminal state
    pub async fn finished(&self) -> TaskState {
        let mut rx = self.state.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            // The sender lives in `self`, so this only fails if it is gone
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Move to `next`; invalid transitions are refused
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        let mut from = next;
        let moved = self.state.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if moved {
            tracing::trace!(task = %self.id, key = %self.key, %from, to = %next, "Task transition");
        } else {
            tracing::error!(task = %self.id, %from, to = %next, "Refused invalid task transition");
            debug_assert!(moved, "invalid task transition {from} -> {next}");
        }
        moved
    }
}

impl fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTask")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("locator", &self.locator)
            .field("state", &self.state())
            .finish()
    }
}
