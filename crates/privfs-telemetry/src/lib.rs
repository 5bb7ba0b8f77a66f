//! privfs Telemetry - Logging setup and message correlation.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`], installing a `tracing` subscriber
//!   writing pretty, compact, JSON or full lines to stdout, stderr or rolling
//!   files
//! - [`RequestContext`], a span per inbound message
//!
//! # Example
//!
//! ```rust,no_run
//! use privfs_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), privfs_telemetry::TelemetryError> {
//! let _guard = setup_logging(
//!     &LogConfig::new("info")
//!         .with_format(LogFormat::Json)
//!         .with_directive("privfs_bus=debug"),
//! )?;
//!
//! let ctx = RequestContext::new("tasks").with_operation("mkdir");
//! let _entered = ctx.span().entered();
//! tracing::info!("handling");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogGuard, LogTarget, setup_logging};
