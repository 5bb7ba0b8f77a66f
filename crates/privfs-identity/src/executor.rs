//! Scoped impersonation on a dedicated, non-reusable OS thread.
//!
//! Review note: the thread that ran a privileged window must exit once the
//! window closes. Never move this work onto a pooled thread (tokio's blocking
//! pool, rayon, a custom pool); if a restore ever fails the next task on that
//! thread would inherit the account's credentials.

use std::io;
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{ExecError, ExecResult};
use crate::resolver::Identity;
use crate::sys::{self, Credentials};

/// Runs units of work under a target account's credentials.
///
/// Stateless; clone or share freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivilegeExecutor {
    _private: (),
}

impl PrivilegeExecutor {
    /// Create an executor.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Run `work` as `identity`, blocking the caller until it finishes.
    ///
    /// The service identity runs inline on the calling thread. Any other
    /// identity gets a freshly spawned thread that exits afterwards.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] if the thread cannot be spawned, a credential
    /// change fails (the work never runs), the work panics, or restoring the
    /// original credentials fails.
    pub fn run<F, T>(&self, identity: &Identity, work: F) -> ExecResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if identity.is_service() {
            return Ok(work());
        }

        let identity = identity.clone();
        let handle = thread::Builder::new()
            .name(thread_name(&identity))
            .spawn(move || impersonate(&identity, work))
            .map_err(ExecError::Spawn)?;

        handle.join().map_err(|_| ExecError::Panicked)?
    }

    /// Async variant of [`run`](Self::run).
    ///
    /// Impersonated work still gets its own thread; the caller awaits a
    /// oneshot instead of joining. Service-identity work goes to the runtime's
    /// blocking pool, which is safe because its credentials never change.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub async fn run_async<F, T>(&self, identity: &Identity, work: F) -> ExecResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if identity.is_service() {
            return tokio::task::spawn_blocking(work)
                .await
                .map_err(|_| ExecError::Panicked);
        }

        let identity = identity.clone();
        let (tx, rx) = oneshot::channel();
        thread::Builder::new()
            .name(thread_name(&identity))
            .spawn(move || {
                let outcome = impersonate(&identity, work);
                // Receiver gone means the caller was cancelled; nothing to do.
                let _ = tx.send(outcome);
            })
            .map_err(ExecError::Spawn)?;

        // A dropped sender without a value means the thread panicked.
        rx.await.map_err(|_| ExecError::Panicked)?
    }
}

fn thread_name(identity: &Identity) -> String {
    format!("privfs-as-{}", identity.uid())
}

/// Body of the dedicated thread.
fn impersonate<F, T>(identity: &Identity, work: F) -> ExecResult<T>
where
    F: FnOnce() -> T,
{
    let guard = CredentialGuard::capture()?;
    guard.enter(identity)?;
    debug!(
        uid = identity.uid(),
        gid = identity.gid(),
        "entered impersonation window"
    );

    let out = work();

    guard.restore()?;
    Ok(out)
}

/// Original credentials of the current thread, restored on drop.
///
/// Drop covers the early-exit paths (a partially applied `enter`, a panic in
/// the unit of work). The normal path calls [`restore`](Self::restore) so a
/// failure can be reported.
struct CredentialGuard {
    original: Credentials,
    armed: bool,
}

impl CredentialGuard {
    fn capture() -> ExecResult<Self> {
        let original = sys::current().map_err(|source| ExecError::Credential {
            step: "getresuid",
            source,
        })?;
        Ok(Self {
            original,
            armed: true,
        })
    }

    /// Groups first, then gid, then uid; dropping the uid last keeps the
    /// capability the first two calls need.
    fn enter(&self, identity: &Identity) -> ExecResult<()> {
        let (real_uid, _, saved_uid) = self.original.uid;
        let (_, _, saved_gid) = self.original.gid;

        sys::set_groups(identity.groups()).map_err(credential("setgroups"))?;
        sys::set_resgid(identity.gid(), identity.gid(), saved_gid)
            .map_err(credential("setresgid"))?;
        sys::set_resuid(real_uid, identity.uid(), saved_uid).map_err(credential("setresuid"))?;
        Ok(())
    }

    fn restore(mut self) -> ExecResult<()> {
        self.armed = false;
        self.apply_original()
    }

    /// Reverse order of [`enter`](Self::enter).
    fn apply_original(&self) -> ExecResult<()> {
        let (ru, eu, su) = self.original.uid;
        let (rg, eg, sg) = self.original.gid;

        sys::set_resuid(ru, eu, su).map_err(restore("setresuid"))?;
        sys::set_resgid(rg, eg, sg).map_err(restore("setresgid"))?;
        sys::set_groups(&self.original.groups).map_err(restore("setgroups"))?;
        Ok(())
    }
}

impl Drop for CredentialGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // The thread exits right after this, so a failure here cannot leak
        // credentials; it is still worth knowing about.
        if let Err(e) = self.apply_original() {
            error!(error = %e, "failed to restore credentials on unwind");
        }
    }
}

fn credential(step: &'static str) -> impl FnOnce(io::Error) -> ExecError {
    move |source| ExecError::Credential { step, source }
}

fn restore(step: &'static str) -> impl FnOnce(io::Error) -> ExecError {
    move |source| ExecError::Restore { step, source }
}
