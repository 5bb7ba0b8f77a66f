//! privfs Worker - The privileged filesystem service.
//!
//! This crate provides:
//! - [`Dispatcher`], the closed dispatch table from a decoded request to the
//!   operation run under the right identity
//! - Request/reply handlers for list, stat, read and write-chunk
//! - The work-queue pull loop for every mutating operation, publishing a job
//!   event after each attempt
//! - The upload sweeper
//! - [`Worker`], which starts and stops all of the above on one [`Broker`]
//! - [`exec_local`], the same dispatch table without a broker
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use privfs_bus::MemoryBroker;
//! use privfs_config::Config;
//! use privfs_ops::UploadTracker;
//! use privfs_worker::{Worker, bridge};
//!
//! # async fn example() -> Result<(), privfs_worker::WorkerError> {
//! let config = Config::default();
//! let tracker = Arc::new(UploadTracker::new(config.uploads.stale_after()));
//! let worker = Worker::start(
//!     Arc::new(MemoryBroker::new()),
//!     bridge::to_worker_options(&config),
//!     tracker,
//! )
//! .await?;
//! worker.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Broker`]: privfs_bus::Broker

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;

mod dispatch;
mod error;
mod events;
mod exec;
mod runtime;
mod sweeper;
mod sync;
mod tasks;

pub use dispatch::Dispatcher;
pub use error::{WorkerError, WorkerResult};
pub use events::{JobPublisher, job_event};
pub use exec::{ExecOutcome, exec_local};
pub use runtime::{Worker, WorkerOptions};
pub use sweeper::{spawn_sweeper, sweep_once};
