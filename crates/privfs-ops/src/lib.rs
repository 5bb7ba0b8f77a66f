//! privfs Ops - The filesystem operation set.
//!
//! This crate provides:
//! - One synchronous function per operation ([`list`], [`stat`], [`read`],
//!   [`mkdir`], [`copy`], [`move_entry`], [`rename`], [`delete`], [`chmod`],
//!   [`chown`], [`write_chunk`], [`assemble`])
//! - [`perform`], the exhaustive dispatch from an [`Operation`] to its function
//! - The chunk staging layout used by uploads
//! - [`UploadTracker`], an in-memory view of upload sessions with explicit
//!   time-based eviction
//!
//! Every function runs with whatever credentials the calling thread has. It is
//! the caller's job to put the thread under the right identity first; nothing
//! here changes credentials.
//!
//! [`Operation`]: privfs_core::Operation

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod inspect;
mod mutate;
mod naming;
mod perform;
mod tracker;
mod tree;
mod upload;

pub use inspect::{READ_CAP, list, read, read_capped, stat};
pub use mutate::{chmod, chown, copy, delete, mkdir, move_entry, move_with, rename};
pub use naming::DEFAULT_FOLDER_NAME;
pub use perform::perform;
pub use tracker::{
    Clock, ManualClock, SystemClock, TrackerError, TrackerResult, UploadSession, UploadState,
    UploadTracker,
};
pub use upload::{
    STAGING_PREFIX, assemble, chunk_path, is_staging_dir, remove_staging, staging_dir,
    upload_id_of, write_chunk,
};

use std::path::Path;

/// Lossy string form of a path, as reported on the wire.
pub(crate) fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
