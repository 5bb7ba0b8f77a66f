//! privfs Identity - who an operation runs as, and how.
//!
//! This crate provides:
//! - [`resolve`], mapping an account name to numeric credentials
//! - [`PrivilegeExecutor`], running a unit of work under those credentials
//!
//! # Credential isolation
//!
//! On Linux, uid/gid/supplementary groups are per-thread kernel state, but the
//! libc wrappers broadcast every change to all threads of the process. The
//! executor therefore issues the raw syscalls on a freshly spawned OS thread
//! and lets that thread exit afterwards. A thread that has ever dropped
//! privilege is never handed back to any pool.
//!
//! ```rust,no_run
//! use privfs_identity::{PrivilegeExecutor, resolve};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = resolve(Some("alice"))?;
//! let executor = PrivilegeExecutor::new();
//! let listing = executor.run(&identity, || std::fs::read_dir("/home/alice").map(|d| d.count()))?;
//! # let _ = listing;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod executor;
mod resolver;
mod sys;

pub use error::{ExecError, ExecResult, IdentityError, IdentityResult};
pub use executor::PrivilegeExecutor;
pub use resolver::{Identity, resolve};

/// Effective uid of the calling thread.
#[must_use]
pub fn current_euid() -> u32 {
    nix::unistd::geteuid().as_raw()
}
