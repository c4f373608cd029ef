//! # ocl-worker
//!
//! Background task runner for the terminology content store.
//!
//! The store itself is synchronous. This crate shares it between async tasks
//! behind a `tokio` read/write lock and runs long operations (expansions,
//! reference batches, the collection expansions maintenance job) on the
//! blocking thread pool, where they can be cancelled. It also provides the
//! event channel, configuration loading and JSON snapshot persistence used by
//! the `ocl-worker` binary.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod snapshot;
pub mod tasks;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use events::{spawn_event_logger, ChannelEventHook};
pub use tasks::{TaskId, TaskOutcome, TaskRunner, TaskStatus};
