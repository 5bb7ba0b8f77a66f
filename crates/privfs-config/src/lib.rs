//! privfs Config - Layered configuration for the filesystem worker.
//!
//! # Precedence
//!
//! Lowest first:
//!
//! 1. Embedded defaults (`defaults.toml`)
//! 2. `/etc/privfs/worker.toml`
//! 3. The file passed with `--config`
//! 4. Environment variables, applied only to fields no file set
//!    (`PRIVFS_BROKER_URL`/`NATS_URL`, `PRIVFS_BROKER_USER`/`NATS_USER`,
//!    `PRIVFS_BROKER_PASSWORD`/`NATS_PASS`, `PRIVFS_LOG_LEVEL`,
//!    `PRIVFS_LOG_FORMAT`, `PRIVFS_SUBJECT_ROOT`)
//!
//! ```rust,no_run
//! use privfs_config::Config;
//!
//! # fn main() -> Result<(), privfs_config::ConfigError> {
//! let resolved = Config::load(None)?;
//! println!("{}", resolved.config.subjects.root);
//! # Ok(())
//! # }
//! ```
//!
//! This crate depends on no other privfs crate. Conversion into broker,
//! logging and tracker settings happens in the worker.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Layer merging with source tracking.
pub mod merge;
/// Annotated rendering.
pub mod show;
/// Configuration structs.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use merge::ConfigLayer;
pub use show::ResolvedConfig;
pub use types::*;

impl Config {
    /// Load with the full precedence chain.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit)
    }
}
