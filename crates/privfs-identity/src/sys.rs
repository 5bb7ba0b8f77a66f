//! Raw per-thread credential syscalls.
//!
//! glibc's `setgroups`/`setresgid`/`setresuid` wrappers signal every thread
//! in the process to apply the same change. These wrappers call the kernel
//! directly, so only the calling thread is affected.
//!
//! Syscall numbers are the 64-bit Linux ones; 32-bit targets would need the
//! `*32` variants.

#![allow(unsafe_code)]

use std::io;

/// Credentials of the calling thread as captured before impersonation.
#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub(crate) uid: (u32, u32, u32),
    pub(crate) gid: (u32, u32, u32),
    pub(crate) groups: Vec<u32>,
}

/// Read real/effective/saved ids and supplementary groups of this thread.
#[cfg(target_os = "linux")]
pub(crate) fn current() -> io::Result<Credentials> {
    use nix::unistd::{getgroups, getresgid, getresuid};

    let uid = getresuid().map_err(io::Error::from)?;
    let gid = getresgid().map_err(io::Error::from)?;
    let groups = getgroups().map_err(io::Error::from)?;
    Ok(Credentials {
        uid: (uid.real.as_raw(), uid.effective.as_raw(), uid.saved.as_raw()),
        gid: (gid.real.as_raw(), gid.effective.as_raw(), gid.saved.as_raw()),
        groups: groups.into_iter().map(|g| g.as_raw()).collect(),
    })
}

#[cfg(target_os = "linux")]
fn check(rc: libc::c_long) -> io::Result<()> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Replace the calling thread's supplementary group list.
#[cfg(target_os = "linux")]
pub(crate) fn set_groups(groups: &[u32]) -> io::Result<()> {
    let gids: &[libc::gid_t] = groups;
    // SAFETY: `gids` outlives the call; the kernel reads exactly `len`
    // elements from the pointer. An empty list passes a valid dangling
    // pointer with length zero, which the kernel does not dereference.
    let rc = unsafe { libc::syscall(libc::SYS_setgroups, gids.len(), gids.as_ptr()) };
    check(rc)
}

/// Set real, effective and saved gid of the calling thread.
#[cfg(target_os = "linux")]
pub(crate) fn set_resgid(real: u32, effective: u32, saved: u32) -> io::Result<()> {
    // SAFETY: plain integer arguments; no memory is shared with the kernel.
    let rc = unsafe {
        libc::syscall(libc::SYS_setresgid, real, effective, saved)
    };
    check(rc)
}

/// Set real, effective and saved uid of the calling thread.
#[cfg(target_os = "linux")]
pub(crate) fn set_resuid(real: u32, effective: u32, saved: u32) -> io::Result<()> {
    // SAFETY: plain integer arguments; no memory is shared with the kernel.
    let rc = unsafe {
        libc::syscall(libc::SYS_setresuid, real, effective, saved)
    };
    check(rc)
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "per-thread credentials require Linux",
    )
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current() -> io::Result<Credentials> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_groups(_groups: &[u32]) -> io::Result<()> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_resgid(_real: u32, _effective: u32, _saved: u32) -> io::Result<()> {
    Err(unsupported())
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_resuid(_real: u32, _effective: u32, _saved: u32) -> io::Result<()> {
    Err(unsupported())
}
