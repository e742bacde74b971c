//! Delivery targets for load results
//!
//! An [`EventLoop`] is a queue owned by the caller (a UI thread, a test, the
//! CLI main task). Workers post deliveries onto it through a cloneable
//! [`ContextHandle`]; the owner runs them by pumping the loop. Once the
//! context is destroyed, posts are refused and the delivery is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one event loop for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

/// Cloneable sender side of an [`EventLoop`]
#[derive(Clone)]
pub struct ContextHandle {
    id: ContextId,
    sender: mpsc::UnboundedSender<Job>,
    alive: Arc<AtomicBool>,
}

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Queue `job` on the owning loop; false if the context is gone
    pub(crate) fn post(&self, job: Job) -> bool {
        self.is_alive() && self.sender.send(job).is_ok()
    }

    pub(crate) fn invalidate(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Caller-owned delivery queue
pub struct EventLoop {
    handle: ContextHandle,
    receiver: mpsc::UnboundedReceiver<Job>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            handle: ContextHandle {
                id,
                sender,
                alive: Arc::new(AtomicBool::new(true)),
            },
            receiver,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Run every delivery already queued, without waiting
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next delivery and run it on the current task
    pub async fn turn(&mut self) {
        // The loop holds its own sender, so the channel never closes
        if let Some(job) = self.receiver.recv().await {
            job();
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.handle.invalidate();
    }
}

/// Where a receiver is invoked
#[derive(Debug, Clone)]
pub enum DispatchMode {
    /// Marshalled onto the caller's event loop
    Context(ContextHandle),
    /// Invoked directly on the worker that finished the load
    Plain,
}

impl DispatchMode {
    pub(crate) fn context_id(&self) -> Option<ContextId> {
        match self {
            Self::Context(handle) => Some(handle.id()),
            Self::Plain => None,
        }
    }
}
