//! Load dispatcher
//!
//! `load` derives the cache key and either joins the task already in flight
//! for it or registers and spawns a new one. Tasks queue on a FIFO semaphore
//! sized to the worker count, so at most that many resolve at once and a key
//! in flight is never decoded twice.
//!
//! A running task:
//! 1. looks the key up in the tiered cache;
//! 2. on a miss, decodes on the blocking pool and puts the result;
//! 3. takes every attached receiver out of the registry;
//! 4. post-processes per receiver and delivers, on the receiver's event loop
//!    or directly on the worker.
//!
//! Decode and storage failures never cross this boundary as errors: they end
//! the task FAILED and every receiver is handed `None`.

use crate::context::{ContextHandle, ContextId, DispatchMode};
use crate::creator::{ImageCreator, ProcessedImage};
use crate::decoder::Decoder;
use crate::registry::{InFlightRegistry, Receiver, SubscriberId};
use crate::stats::{DispatcherStatistics, DispatcherStats};
use crate::task::{TaskState, WorkerTask};
use dashmap::DashMap;
use lumen_cache::{derive_key, CacheEntry, Tier, TieredCache};
use lumen_core::{CacheKey, Error, LoaderConfig, Locator, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

/// Where a resolved image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Memory,
    Durable,
    Decoded,
}

struct Shared {
    cache: Arc<TieredCache>,
    decoder: Arc<dyn Decoder>,
    registry: InFlightRegistry,
    pool: Arc<Semaphore>,
    runtime: Handle,
    contexts: DashMap<ContextId, ContextHandle>,
    fade_duration: Duration,
    shut_down: AtomicBool,
    stats: DispatcherStats,
}

/// Deduplicating image load dispatcher
pub struct Dispatcher {
    shared: Arc<Shared>,
    worker_count: usize,
}

impl Dispatcher {
    /// Create a dispatcher on the current tokio runtime
    pub fn new(
        cache: Arc<TieredCache>,
        decoder: Arc<dyn Decoder>,
        config: &LoaderConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::precondition("Dispatcher::new called outside a tokio runtime"))?;
        Self::with_runtime(cache, decoder, config, runtime)
    }

    pub fn with_runtime(
        cache: Arc<TieredCache>,
        decoder: Arc<dyn Decoder>,
        config: &LoaderConfig,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(workers = config.worker_count, "Starting load dispatcher");

        Ok(Self {
            shared: Arc::new(Shared {
                cache,
                decoder,
                registry: InFlightRegistry::new(),
                pool: Arc::new(Semaphore::new(config.worker_count)),
                runtime,
                contexts: DashMap::new(),
                fade_duration: config.fade_duration(),
                shut_down: AtomicBool::new(false),
                stats: DispatcherStats::default(),
            }),
            worker_count: config.worker_count,
        })
    }

    /// Request `locator`, handing the result to `receiver` exactly once.
    ///
    /// Fails only on misuse: after [`shutdown`](Self::shutdown), or with a
    /// context that was never registered or is already destroyed.
    pub fn load<R>(
        &self,
        locator: impl Into<Locator>,
        receiver: R,
        creator: ImageCreator,
        mode: DispatchMode,
    ) -> Result<LoadHandle>
    where
        R: FnOnce(Option<ProcessedImage>) + Send + 'static,
    {
        let shared = &self.shared;
        if shared.shut_down.load(Ordering::Acquire) {
            return Err(Error::precondition("load called after dispatcher shutdown"));
        }
        if let DispatchMode::Context(handle) = &mode {
            if !handle.is_alive() || !shared.contexts.contains_key(&handle.id()) {
                return Err(Error::precondition(format!(
                    "{:?} is not a live container context",
                    handle.id()
                )));
            }
        }

        let locator = locator.into();
        let key = derive_key(&locator);
        let receiver: Receiver = Box::new(receiver);

        if key.is_invalid() {
            tracing::debug!(%locator, "Rejecting malformed locator");
            shared.stats.record_request(false);
            shared.stats.record_failed();
            shared.deliver(receiver, mode, None);
            return Ok(LoadHandle {
                shared: Arc::clone(shared),
                task: Arc::new(WorkerTask::rejected(key, locator)),
                subscriber: None,
                coalesced: false,
            });
        }

        let attachment = shared.registry.attach(&key, receiver, creator, mode, || {
            Arc::new(WorkerTask::new(key.clone(), locator.clone()))
        });
        shared.stats.record_request(attachment.coalesced);

        if attachment.coalesced {
            tracing::debug!(%key, task = %attachment.task.id(), "Joined in-flight load");
        } else {
            shared.stats.record_spawn();
            tracing::debug!(%key, %locator, task = %attachment.task.id(), "Queued load");
            shared.runtime.spawn(run_task(
                Arc::clone(shared),
                Arc::clone(&attachment.task),
            ));
        }

        Ok(LoadHandle {
            shared: Arc::clone(shared),
            task: attachment.task,
            subscriber: Some(attachment.subscriber),
            coalesced: attachment.coalesced,
        })
    }

    /// Detach the handle's receiver; see [`LoadHandle::cancel`]
    pub fn cancel(&self, handle: &LoadHandle) -> bool {
        handle.cancel()
    }

    /// Register a container's event loop as a delivery target
    pub fn container_created(&self, context: &ContextHandle) -> Result<()> {
        if !context.is_alive() {
            return Err(Error::precondition(format!(
                "{:?} was already destroyed",
                context.id()
            )));
        }
        self.shared.contexts.insert(context.id(), context.clone());
        tracing::debug!(context = ?context.id(), "Container created");
        Ok(())
    }

    /// Invalidate a container's context and detach its receivers.
    /// Returns how many receivers were detached.
    pub fn container_destroyed(&self, context: &ContextHandle) -> usize {
        context.invalidate();
        self.shared.contexts.remove(&context.id());
        let detached = self.shared.registry.detach_context(context.id());
        self.shared.stats.record_suppressed(detached);
        tracing::debug!(context = ?context.id(), detached, "Container destroyed");
        detached
    }

    /// Stop accepting loads. Running tasks finish and deliver; queued tasks
    /// are cancelled without delivery.
    pub fn shutdown(&self) {
        if !self.shared.shut_down.swap(true, Ordering::AcqRel) {
            self.shared.pool.close();
            tracing::info!(
                in_flight = self.shared.registry.len(),
                "Load dispatcher shut down"
            );
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.shared.cache
    }

    pub fn statistics(&self) -> DispatcherStatistics {
        self.shared.stats.snapshot(self.shared.registry.len())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("worker_count", &self.worker_count)
            .field("in_flight", &self.shared.registry.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Caller's view of one `load`
pub struct LoadHandle {
    shared: Arc<Shared>,
    task: Arc<WorkerTask>,
    subscriber: Option<SubscriberId>,
    coalesced: bool,
}

impl LoadHandle {
    pub fn key(&self) -> &CacheKey {
        self.task.key()
    }

    pub fn task_state(&self) -> TaskState {
        self.task.state()
    }

    /// Whether this load joined a task started by an earlier one
    pub fn is_coalesced(&self) -> bool {
        self.coalesced
    }

    /// Detach this handle's receiver only. Returns false if it was already
    /// delivered to or detached. When the last receiver goes, the task is
    /// cancelled before it starts, or finishes populating the cache without
    /// delivering.
    pub fn cancel(&self) -> bool {
        let Some(subscriber) = self.subscriber else {
            return false;
        };
        match self
            .shared
            .registry
            .detach(self.task.key(), self.task.id(), subscriber)
        {
            Some(remaining) => {
                self.shared.stats.record_suppressed(1);
                tracing::debug!(key = %self.task.key(), remaining, "Receiver detached");
                true
            }
            None => false,
        }
    }

    /// Wait until the underlying task reaches a terminal state
    pub async fn finished(&self) -> TaskState {
        self.task.finished().await
    }
}

impl std::fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadHandle")
            .field("task", &self.task)
            .field("coalesced", &self.coalesced)
            .finish()
    }
}

impl Shared {
    fn deliver(&self, receiver: Receiver, mode: DispatchMode, payload: Option<ProcessedImage>) {
        match mode {
            DispatchMode::Plain => {
                // A panicking receiver must not strand the task or its siblings
                if panic::catch_unwind(AssertUnwindSafe(|| receiver(payload))).is_err() {
                    tracing::error!("Receiver panicked during plain delivery");
                }
                self.stats.record_delivery();
            }
            DispatchMode::Context(context) => {
                if context.post(Box::new(move || receiver(payload))) {
                    self.stats.record_delivery();
                } else {
                    self.stats.record_suppressed(1);
                    tracing::debug!(
                        context = ?context.id(),
                        "Dropped delivery to destroyed context"
                    );
                }
            }
        }
    }

    async fn resolve(&self, task: &WorkerTask) -> Result<(CacheEntry, Origin)> {
        if let Some(hit) = self.cache.lookup(task.key()).await {
            let origin = match hit.tier {
                Tier::Memory => Origin::Memory,
                Tier::Durable => Origin::Durable,
            };
            return Ok((hit.entry, origin));
        }

        let decoder = Arc::clone(&self.decoder);
        let locator = task.locator().clone();
        let image = tokio::task::spawn_blocking(move || decoder.decode(&locator))
            .await
            .map_err(|e| {
                Error::decode_failure_with_source(task.locator().as_str(), "decoder aborted", e)
            })??;

        let outcome = self.cache.put(task.key().clone(), image).await;
        Ok((outcome.entry, Origin::Decoded))
    }
}

async fn run_task(shared: Arc<Shared>, task: Arc<WorkerTask>) {
    let key = task.key().clone();

    let permit = match Arc::clone(&shared.pool).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let orphans = shared.registry.finish(&key, task.id());
            shared.stats.record_suppressed(orphans.len());
            task.transition(TaskState::Cancelled);
            shared.stats.record_cancelled();
            tracing::debug!(%key, task = %task.id(), "Pool closed before task started");
            return;
        }
    };

    if shared.registry.abandon_if_idle(&key, task.id()) {
        task.transition(TaskState::Cancelled);
        shared.stats.record_cancelled();
        tracing::debug!(%key, task = %task.id(), "Cancelled before start");
        return;
    }

    task.transition(TaskState::Running);
    let resolved = shared.resolve(&task).await;
    let subscribers = shared.registry.finish(&key, task.id());
    drop(permit);

    if subscribers.is_empty() {
        task.transition(TaskState::Cancelled);
        shared.stats.record_cancelled();
        tracing::debug!(%key, task = %task.id(), cached = resolved.is_ok(), "No receivers left");
        return;
    }

    match resolved {
        Ok((entry, origin)) => {
            let first_appearance = origin != Origin::Memory;
            tracing::debug!(
                %key,
                ?origin,
                receivers = subscribers.len(),
                "Delivering"
            );
            for subscriber in subscribers {
                let processed = subscriber.creator.prepare(
                    Arc::clone(entry.image()),
                    first_appearance,
                    shared.fade_duration,
                );
                let receiver = subscriber.receiver.into_inner().unwrap_or_else(PoisonError::into_inner);
                shared.deliver(receiver, subscriber.mode, Some(processed));
            }
            task.transition(TaskState::Completed);
            shared.stats.record_completed();
        }
        Err(e) => {
            if e.is_absence() {
                tracing::warn!(%key, locator = %task.locator(), error = %e, "Load failed");
            } else {
                tracing::error!(
                    %key,
                    locator = %task.locator(),
                    error = %e,
                    defect = e.is_defect(),
                    "Load failed with an unexpected error"
                );
            }
            for subscriber in subscribers {
                let receiver = subscriber.receiver.into_inner().unwrap_or_else(PoisonError::into_inner);
                shared.deliver(receiver, subscriber.mode, None);
            }
            task.transition(TaskState::Failed);
            shared.stats.record_failed();
        }
    }
}
