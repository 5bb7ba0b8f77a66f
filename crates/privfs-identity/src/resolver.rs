//! Account name to numeric credentials.

use std::ffi::CString;

use nix::unistd::{User, getgrouplist};
use tracing::debug;

use crate::error::{IdentityError, IdentityResult};

/// Numeric credentials of one account.
///
/// Resolved fresh for every request; account mappings can change between
/// requests, so identities are never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    uid: u32,
    gid: u32,
    groups: Vec<u32>,
}

impl Identity {
    /// The service's own identity: run without impersonation.
    #[must_use]
    pub const fn service() -> Self {
        Self {
            uid: 0,
            gid: 0,
            groups: Vec::new(),
        }
    }

    /// Identity from raw ids.
    #[must_use]
    pub fn new(uid: u32, gid: u32, groups: Vec<u32>) -> Self {
        Self { uid, gid, groups }
    }

    /// Account id.
    #[must_use]
    pub const fn uid(&self) -> u32 {
        self.uid
    }

    /// Primary group id.
    #[must_use]
    pub const fn gid(&self) -> u32 {
        self.gid
    }

    /// Supplementary group ids.
    #[must_use]
    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    /// `uid == 0` is the sentinel for "no impersonation".
    #[must_use]
    pub const fn is_service(&self) -> bool {
        self.uid == 0
    }
}

/// Resolve an account name to its credentials.
///
/// `None` or an empty name resolves to [`Identity::service`] without any
/// lookup.
///
/// # Errors
///
/// Returns [`IdentityError::NotFound`] if the account does not exist and
/// [`IdentityError::LookupFailed`] if its passwd entry or group list cannot
/// be read.
pub fn resolve(account: Option<&str>) -> IdentityResult<Identity> {
    let Some(name) = account.filter(|a| !a.is_empty()) else {
        return Ok(Identity::service());
    };

    let lookup_failed = |reason: String| IdentityError::LookupFailed {
        account: name.to_owned(),
        reason,
    };

    let user = User::from_name(name)
        .map_err(|e| lookup_failed(e.to_string()))?
        .ok_or_else(|| IdentityError::NotFound(name.to_owned()))?;

    let c_name = CString::new(name).map_err(|_| IdentityError::NotFound(name.to_owned()))?;
    let groups = getgrouplist(&c_name, user.gid)
        .map_err(|e| lookup_failed(format!("groups: {e}")))?
        .into_iter()
        .map(|g| g.as_raw())
        .collect::<Vec<_>>();

    debug!(
        account = name,
        uid = user.uid.as_raw(),
        gid = user.gid.as_raw(),
        groups = groups.len(),
        "resolved account"
    );

    Ok(Identity::new(user.uid.as_raw(), user.gid.as_raw(), groups))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_account_is_service_identity() {
        assert_eq!(resolve(None).unwrap(), Identity::service());
        assert_eq!(resolve(Some("")).unwrap(), Identity::service());
        assert!(resolve(None).unwrap().is_service());
    }

    #[test]
    fn root_account_resolves_to_uid_zero() {
        let identity = resolve(Some("root")).unwrap();
        assert_eq!(identity.uid(), 0);
        assert!(identity.is_service());
        assert!(identity.groups().contains(&identity.gid()));
    }

    #[test]
    fn unknown_account_is_not_found() {
        let err = resolve(Some("privfs-no-such-account")).unwrap_err();
        assert!(
            matches!(err, IdentityError::NotFound(ref n) if n == "privfs-no-such-account"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn raw_identity_accessors() {
        let identity = Identity::new(1000, 1000, vec![1000, 27]);
        assert_eq!(identity.uid(), 1000);
        assert_eq!(identity.gid(), 1000);
        assert_eq!(identity.groups(), &[1000, 27]);
        assert!(!identity.is_service());
    }
}
