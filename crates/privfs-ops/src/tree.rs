//! Recursive copy and removal.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use privfs_core::{FsError, FsResult};

/// Copy `src` to `dst`, which must not exist.
///
/// Regular files keep their permission bits. Directories are created, filled,
/// then given the source's permission bits (so a read-only source directory
/// can still be populated). Symlinks are recreated pointing at the same
/// target. Anything else fails the copy.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> FsResult<()> {
    let meta = fs::symlink_metadata(src)?;
    let file_type = meta.file_type();

    if file_type.is_symlink() {
        symlink(fs::read_link(src)?, dst)?;
    } else if file_type.is_dir() {
        fs::create_dir(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        fs::set_permissions(dst, meta.permissions())?;
    } else if file_type.is_file() {
        fs::copy(src, dst)?;
    } else {
        return Err(FsError::generic(format!(
            "cannot copy special file {}",
            src.display()
        )));
    }
    Ok(())
}

/// Remove a file, symlink, or directory tree.
pub(crate) fn remove_tree(path: &Path) -> FsResult<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Whether `candidate` is `dir` itself or lies beneath it, after resolving
/// symlinks in both.
pub(crate) fn is_within(candidate: &Path, dir: &Path) -> FsResult<bool> {
    let candidate = fs::canonicalize(candidate)?;
    let dir = fs::canonicalize(dir)?;
    Ok(candidate.starts_with(dir))
}
