use std::io;

use thiserror::Error;

/// Account lookup failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No such account.
    #[error("user {0:?}: unknown user")]
    NotFound(String),

    /// The account exists but its ids or groups could not be read.
    #[error("user {account:?}: lookup failed: {reason}")]
    LookupFailed {
        /// Account being resolved.
        account: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Result type for account resolution.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Failures of the privileged execution window itself.
///
/// None of these mean the unit of work failed; they mean it either never ran
/// or its thread could not be cleaned up.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A credential syscall failed before the unit of work ran.
    #[error("{step}: {source}")]
    Credential {
        /// Syscall that failed (`setgroups`, `setresgid`, `setresuid`).
        step: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// Restoring the original credentials failed after the unit of work ran.
    #[error("restore {step}: {source}")]
    Restore {
        /// Syscall that failed.
        step: &'static str,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// The dedicated thread could not be created.
    #[error("failed to spawn impersonation thread: {0}")]
    Spawn(#[source] io::Error),

    /// The unit of work panicked; its thread is gone.
    #[error("impersonated unit of work panicked")]
    Panicked,
}

/// Result type for privileged execution.
pub type ExecResult<T> = Result<T, ExecError>;
