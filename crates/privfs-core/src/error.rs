//! Error taxonomy shared by every operation and both transport paths.

use std::io;

use thiserror::Error;

/// Classified failure of a filesystem operation.
///
/// Every variant has a stable wire code (see [`FsError::code`]) that callers
/// use to tell a conflict from a permission problem without parsing text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Access or permission error from the OS (`EACCES`, `EPERM`).
    #[error("permission denied")]
    PermissionDenied,

    /// The path does not exist (`ENOENT`).
    #[error("no such file or directory")]
    NotFound,

    /// Destination conflict, or a non-empty directory on removal.
    #[error("destination already exists")]
    AlreadyExists,

    /// Anything else, including validation failures.
    #[error("{0}")]
    Generic(String),
}

impl FsError {
    /// Build a [`FsError::Generic`] from any message.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic(message.into())
    }

    /// Wire code carried in sync replies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "EACCES",
            Self::NotFound => "ENOENT",
            Self::AlreadyExists => "EEXIST",
            Self::Generic(_) => "ERR",
        }
    }

    /// Rebuild an error from a wire code and message.
    ///
    /// Unknown codes become [`FsError::Generic`] carrying `message`.
    #[must_use]
    pub fn from_wire(code: &str, message: &str) -> Self {
        match code {
            "EACCES" => Self::PermissionDenied,
            "ENOENT" => Self::NotFound,
            "EEXIST" => Self::AlreadyExists,
            _ => Self::Generic(message.to_owned()),
        }
    }

    /// Process exit status used by the local `exec` command.
    #[must_use]
    pub const fn exit_status(&self) -> i32 {
        match self {
            Self::PermissionDenied => 13,
            Self::NotFound => 2,
            Self::AlreadyExists => 17,
            Self::Generic(_) => 1,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                Self::AlreadyExists
            },
            _ => Self::Generic(err.to_string()),
        }
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Structural problems with an inbound message.
///
/// These are never retried: redelivering a structurally invalid message
/// cannot make it valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The envelope could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The subject names an operation this worker does not implement.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_into_taxonomy() {
        let denied = io::Error::from_raw_os_error(13);
        assert_eq!(FsError::from(denied), FsError::PermissionDenied);

        let eperm = io::Error::from_raw_os_error(1);
        assert_eq!(FsError::from(eperm), FsError::PermissionDenied);

        let missing = io::Error::from_raw_os_error(2);
        assert_eq!(FsError::from(missing), FsError::NotFound);

        let exists = io::Error::from_raw_os_error(17);
        assert_eq!(FsError::from(exists), FsError::AlreadyExists);

        let not_empty = io::Error::from_raw_os_error(39);
        assert_eq!(FsError::from(not_empty), FsError::AlreadyExists);
    }

    #[test]
    fn unrecognized_io_error_is_generic_with_message() {
        let err = FsError::from(io::Error::other("disk on fire"));
        assert_eq!(err, FsError::Generic("disk on fire".to_string()));
        assert_eq!(err.code(), "ERR");
    }

    #[test]
    fn codes_and_exit_statuses() {
        assert_eq!(FsError::PermissionDenied.code(), "EACCES");
        assert_eq!(FsError::NotFound.code(), "ENOENT");
        assert_eq!(FsError::AlreadyExists.code(), "EEXIST");
        assert_eq!(FsError::PermissionDenied.exit_status(), 13);
        assert_eq!(FsError::NotFound.exit_status(), 2);
        assert_eq!(FsError::AlreadyExists.exit_status(), 17);
        assert_eq!(FsError::generic("x").exit_status(), 1);
    }

    #[test]
    fn wire_codes_round_trip() {
        for err in [
            FsError::PermissionDenied,
            FsError::NotFound,
            FsError::AlreadyExists,
            FsError::generic("quota exceeded"),
        ] {
            assert_eq!(FsError::from_wire(err.code(), &err.to_string()), err);
        }
        assert_eq!(
            FsError::from_wire("EWHAT", "odd"),
            FsError::generic("odd")
        );
    }

    #[test]
    fn messages_are_fixed_for_classified_errors() {
        assert_eq!(FsError::PermissionDenied.to_string(), "permission denied");
        assert_eq!(FsError::NotFound.to_string(), "no such file or directory");
        assert_eq!(
            FsError::AlreadyExists.to_string(),
            "destination already exists"
        );
    }
}
