//! Asynchronous image loading on top of the lumen tiered cache
//!
//! [`Dispatcher::load`] takes a locator, a receiver callback, a
//! post-processor and a dispatch mode. Concurrent loads of the same image
//! share one task and one decode; each receiver still gets its own
//! post-processing and is called on its own event loop (or directly on the
//! worker in plain mode).

pub mod context;
pub mod creator;
pub mod decoder;
pub mod dispatcher;
pub mod payload;
pub mod registry;
pub mod stats;
pub mod task;

pub use context::{ContextHandle, ContextId, DispatchMode, EventLoop};
pub use creator::{Drawable, FadeTransition, ImageCreator, Layer, ProcessedImage};
pub use decoder::Decoder;
pub use dispatcher::{Dispatcher, LoadHandle};
pub use payload::{resolve_locator, resolve_locator_with, IncomingPayload, DEFAULT_ACCEPTED_KINDS};
pub use registry::{InFlightRegistry, Receiver, SubscriberId};
pub use stats::DispatcherStatistics;
pub use task::{TaskId, TaskState, WorkerTask};
