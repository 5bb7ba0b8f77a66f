//! Argument validation performed before any filesystem access.

use std::path::Path;

use crate::error::{FsError, FsResult};

/// Check that `path` is absolute and free of NUL bytes.
///
/// Purely lexical; the filesystem is never touched.
///
/// # Errors
///
/// Returns [`FsError::Generic`] describing the violation.
pub fn validate_path(path: &str) -> FsResult<&Path> {
    if path.contains('\0') {
        return Err(FsError::generic("invalid path: null byte"));
    }
    let p = Path::new(path);
    if !p.is_absolute() {
        return Err(FsError::generic("invalid path: must be absolute"));
    }
    Ok(p)
}

/// Validate every path, stopping at the first failure.
///
/// # Errors
///
/// Returns the first validation failure.
pub fn validate_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> FsResult<()> {
    for path in paths {
        validate_path(path)?;
    }
    Ok(())
}

/// Check a single final path component (rename target, mkdir name).
///
/// # Errors
///
/// Returns [`FsError::Generic`] for empty names, `.`, `..`, or names
/// containing a separator or NUL byte.
pub fn validate_entry_name(name: &str) -> FsResult<()> {
    if name.is_empty() {
        return Err(FsError::generic("invalid name: empty"));
    }
    if name == "." || name == ".." {
        return Err(FsError::generic(format!("invalid name: {name:?}")));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::generic(
            "invalid name: must not contain a path separator or null byte",
        ));
    }
    Ok(())
}

/// Check an upload identifier before it becomes part of a directory name.
///
/// # Errors
///
/// Returns [`FsError::Generic`] unless the id is non-empty ASCII
/// alphanumerics, `-` and `_`.
pub fn validate_upload_id(upload_id: &str) -> FsResult<()> {
    if upload_id.is_empty() {
        return Err(FsError::generic("invalid upload id: empty"));
    }
    if !upload_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(FsError::generic(format!(
            "invalid upload id {upload_id:?}: only alphanumeric, dash, and underscore allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_passes() {
        assert_eq!(
            validate_path("/srv/share").unwrap(),
            Path::new("/srv/share")
        );
    }

    #[test]
    fn relative_and_empty_paths_fail() {
        for bad in ["srv/share", "", "./x", "../etc"] {
            let err = validate_path(bad).unwrap_err();
            assert_eq!(err, FsError::generic("invalid path: must be absolute"));
        }
    }

    #[test]
    fn nul_byte_fails() {
        let err = validate_path("/srv/\0evil").unwrap_err();
        assert_eq!(err, FsError::generic("invalid path: null byte"));
    }

    #[test]
    fn validate_paths_stops_at_first_bad() {
        assert!(validate_paths(["/a", "/b"]).is_ok());
        assert!(validate_paths(["/a", "b"]).is_err());
    }

    #[test]
    fn entry_names() {
        assert!(validate_entry_name("b.txt").is_ok());
        assert!(validate_entry_name("New Folder (2)").is_ok());
        for bad in ["", ".", "..", "a/b", "x\0"] {
            assert!(validate_entry_name(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn upload_ids() {
        assert!(validate_upload_id("3f2a-9c_01").is_ok());
        for bad in ["", "../x", "a b", "a/b"] {
            assert!(validate_upload_id(bad).is_err(), "{bad:?} should fail");
        }
    }
}
