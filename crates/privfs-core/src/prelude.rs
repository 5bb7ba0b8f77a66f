//! Prelude module - commonly used types for convenient import.
//!
//! Use `use privfs_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{FsError, FsResult, ProtocolError};

// Operations
pub use crate::{Envelope, Operation, Transport, Verb};

// Results
pub use crate::{EntryKind, ListEntry, OperationOutput, StatRecord};

// Validation
pub use crate::{validate_path, validate_paths};
