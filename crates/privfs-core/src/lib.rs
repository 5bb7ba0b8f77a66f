//! privfs Core - Shared vocabulary for the privileged filesystem worker.
//!
//! This crate provides:
//! - [`Verb`], the closed set of operation kinds the worker understands
//! - Per-operation request payloads and the [`Operation`] tagged union
//! - Result records returned by successful operations
//! - The [`FsError`] taxonomy and its wire codes
//! - Path and name validation applied before any filesystem access
//!
//! It has no knowledge of brokers, credentials, or the filesystem itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod operation;
mod outcome;
mod validate;
mod verb;

pub use error::{FsError, FsResult, ProtocolError};
pub use operation::{
    AssembleRequest, ChmodRequest, ChownRequest, ChunkMeta, Envelope, MkdirRequest, Operation,
    PathRequest, RenameRequest, TransferRequest,
};
pub use outcome::{CreatedDir, EntryKind, ListEntry, OperationOutput, Relocated, StatRecord};
pub use validate::{validate_entry_name, validate_path, validate_paths, validate_upload_id};
pub use verb::{Transport, Verb};
