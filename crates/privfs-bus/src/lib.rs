//! privfs Bus - Transport between callers and the filesystem worker.
//!
//! This crate provides:
//! - [`Broker`], the seam over a message broker offering core request/reply
//!   and one durable work queue with explicit acknowledgement
//! - [`NatsBroker`] for production (NATS + JetStream) and [`MemoryBroker`] for
//!   tests and local runs
//! - Subject naming, reply and job event bodies
//! - [`FsClient`], the caller-side facade
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use privfs_bus::{FsClient, MemoryBroker, Subjects};
//!
//! # async fn example() -> Result<(), privfs_bus::ClientError> {
//! let broker = Arc::new(MemoryBroker::new());
//! let client = FsClient::new(broker, Subjects::new("privfs.root", "privfs.events"));
//! let entries = client.list("alice", "/home/alice").await?;
//! # let _ = entries;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod broker;
mod client;
mod envelope;
mod error;
mod memory;
mod message;
mod nats;
mod subjects;

pub use broker::{Broker, Delivery, Disposition, Settle, StreamSpec, reply};
pub use client::{ClientError, ClientResult, FsClient, Timeouts};
pub use envelope::{
    HEADER_META, HEADER_STATUS, JobEvent, JobStatus, STATUS_ERROR, SyncReply,
};
pub use error::{BusError, BusResult, FetchError};
pub use memory::{DEFAULT_CHANNEL_CAPACITY, MemoryBroker, QueueStats};
pub use message::{Headers, Message, Subscription};
pub use nats::{NatsBroker, NatsSettings};
pub use subjects::{Subjects, subject_matches};
