//! In-flight request registry
//!
//! One entry per key with a live task. A second load for the same key
//! attaches to the existing entry instead of starting another decode. The
//! task removes its entry exactly once, when it takes the subscribers for
//! delivery; anything attaching after that starts a fresh task.

use crate::context::{ContextId, DispatchMode};
use crate::creator::{ImageCreator, ProcessedImage};
use crate::task::{TaskId, WorkerTask};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lumen_core::CacheKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callback invoked once with the load result, or `None` on failure
pub type Receiver = Box<dyn FnOnce(Option<ProcessedImage>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A receiver waiting on an in-flight task
pub(crate) struct Subscriber {
    pub id: SubscriberId,
    /// Behind a mutex only so the registry stays `Sync`; taken by value on delivery
    pub receiver: Mutex<Receiver>,
    pub creator: ImageCreator,
    pub mode: DispatchMode,
}

struct InFlightRequest {
    task: Arc<WorkerTask>,
    subscribers: Vec<Subscriber>,
}

/// Result of [`InFlightRegistry::attach`]
pub(crate) struct Attachment {
    pub task: Arc<WorkerTask>,
    pub subscriber: SubscriberId,
    /// True when the receiver joined a task that already existed
    pub coalesced: bool,
}

#[derive(Default)]
pub struct InFlightRegistry {
    entries: DashMap<CacheKey, InFlightRequest>,
    next_subscriber: AtomicU64,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a receiver for `key`, creating the task if none is in flight
    pub(crate) fn attach<F>(
        &self,
        key: &CacheKey,
        receiver: Receiver,
        creator: ImageCreator,
        mode: DispatchMode,
        create_task: F,
    ) -> Attachment
    where
        F: FnOnce() -> Arc<WorkerTask>,
    {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            receiver: Mutex::new(receiver),
            creator,
            mode,
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let request = occupied.get_mut();
                request.subscribers.push(subscriber);
                Attachment {
                    task: Arc::clone(&request.task),
                    subscriber: id,
                    coalesced: true,
                }
            }
            Entry::Vacant(vacant) => {
                let task = create_task();
                vacant.insert(InFlightRequest {
                    task: Arc::clone(&task),
                    subscribers: vec![subscriber],
                });
                Attachment {
                    task,
                    subscriber: id,
                    coalesced: false,
                }
            }
        }
    }

    /// Detach one receiver. Returns the number still attached, or `None` if
    /// the receiver was already delivered to or detached.
    pub(crate) fn detach(
        &self,
        key: &CacheKey,
        task: TaskId,
        subscriber: SubscriberId,
    ) -> Option<usize> {
        let mut request = self.entries.get_mut(key)?;
        if request.task.id() != task {
            return None;
        }
        let position = request
            .subscribers
            .iter()
            .position(|s| s.id == subscriber)?;
        request.subscribers.remove(position);
        Some(request.subscribers.len())
    }

    /// Detach every receiver bound to a destroyed context
    pub(crate) fn detach_context(&self, context: ContextId) -> usize {
        let mut detached = 0;
        for mut request in self.entries.iter_mut() {
            let before = request.subscribers.len();
            request
                .subscribers
                .retain(|s| s.mode.context_id() != Some(context));
            detached += before - request.subscribers.len();
        }
        detached
    }

    /// Remove the entry owned by `task` and hand back its subscribers
    pub(crate) fn finish(&self, key: &CacheKey, task: TaskId) -> Vec<Subscriber> {
        self.entries
            .remove_if(key, |_, request| request.task.id() == task)
            .map(|(_, request)| request.subscribers)
            .unwrap_or_default()
    }

    /// Remove the entry owned by `task` if nobody is waiting on it
    pub(crate) fn abandon_if_idle(&self, key: &CacheKey, task: TaskId) -> bool {
        self.entries
            .remove_if(key, |_, request| {
                request.task.id() == task && request.subscribers.is_empty()
            })
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Receivers currently attached to `key`
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.entries
            .get(key)
            .map(|request| request.subscribers.len())
            .unwrap_or(0)
    }
}
