//! Mutating operations: mkdir, copy, move, rename, delete, chmod, chown.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt, lchown};
use std::path::Path;

use nix::unistd::{Group, User};
use privfs_core::{CreatedDir, FsError, FsResult, Relocated, validate_entry_name};
use tracing::{debug, warn};

use crate::display;
use crate::naming::{DEFAULT_FOLDER_NAME, candidates, candidates_keeping_extension, first_free};
use crate::tree::{copy_tree, is_within, remove_tree};

/// Mode for directories created by [`mkdir`], before the umask.
const DIR_MODE: u32 = 0o755;

/// Create a directory under `parent`, picking `name (n)` on collision.
///
/// An empty `name` means [`DEFAULT_FOLDER_NAME`].
///
/// # Errors
///
/// Generic for an invalid name, [`FsError::AlreadyExists`] once every
/// candidate is taken, otherwise the classified error from `mkdir`.
pub fn mkdir(parent: &Path, name: &str) -> FsResult<CreatedDir> {
    let base = if name.is_empty() {
        DEFAULT_FOLDER_NAME
    } else {
        name
    };
    validate_entry_name(base)?;

    for candidate in candidates(base) {
        let path = parent.join(&candidate);
        match fs::DirBuilder::new().mode(DIR_MODE).create(&path) {
            Ok(()) => {
                return Ok(CreatedDir {
                    path: display(&path),
                    name: candidate,
                });
            },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsError::AlreadyExists)
}

/// Copy a file or directory tree into `dst_dir` under a unique name.
///
/// # Errors
///
/// Generic when copying a directory into its own subtree or when the tree
/// holds a special file; otherwise the classified error from the copy.
pub fn copy(src: &Path, dst_dir: &Path) -> FsResult<Relocated> {
    let name = final_component(src)?;
    let meta = fs::symlink_metadata(src)?;
    if !fs::metadata(dst_dir)?.is_dir() {
        return Err(FsError::generic(format!(
            "{} is not a directory",
            dst_dir.display()
        )));
    }

    if meta.is_dir() && is_within(dst_dir, src)? {
        return Err(FsError::generic(
            "cannot copy a directory into itself or one of its subdirectories",
        ));
    }

    let dst = if meta.is_dir() {
        first_free(dst_dir, candidates(&name))?
    } else {
        first_free(dst_dir, candidates_keeping_extension(&name))?
    };

    copy_tree(src, &dst)?;
    Ok(Relocated::to(display(&dst)))
}

/// Move `src` into `dst_dir`, keeping its name.
///
/// # Errors
///
/// [`FsError::AlreadyExists`] if the destination name is taken; otherwise the
/// classified error from the rename or the copy fallback.
pub fn move_entry(src: &Path, dst_dir: &Path) -> FsResult<Relocated> {
    move_with(src, dst_dir, |from, to| fs::rename(from, to))
}

/// [`move_entry`] with an explicit rename primitive.
///
/// On `EXDEV` the entry is copied and the source removed only after the copy
/// succeeded. A failed copy removes what it managed to write and leaves the
/// source alone.
///
/// # Errors
///
/// Same as [`move_entry`].
pub fn move_with<R>(src: &Path, dst_dir: &Path, rename: R) -> FsResult<Relocated>
where
    R: FnOnce(&Path, &Path) -> io::Result<()>,
{
    let name = final_component(src)?;
    let dst = dst_dir.join(&name);
    ensure_vacant(&dst)?;
    fs::symlink_metadata(src)?;

    match rename(src, &dst) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(src = %src.display(), dst = %dst.display(), "cross-device move, copying");
            if let Err(copy_err) = copy_tree(src, &dst) {
                match remove_tree(&dst) {
                    Ok(()) | Err(FsError::NotFound) => {},
                    Err(cleanup_err) => warn!(
                        dst = %dst.display(),
                        error = %cleanup_err,
                        "failed to remove partial move destination"
                    ),
                }
                return Err(copy_err);
            }
            remove_tree(src)?;
        },
        Err(e) => return Err(e.into()),
    }

    Ok(Relocated::to(display(&dst)))
}

/// Rename an entry within its parent directory.
///
/// # Errors
///
/// Generic for an invalid name, [`FsError::AlreadyExists`] if the new name is
/// taken, otherwise the classified error from `rename`.
pub fn rename(path: &Path, new_name: &str) -> FsResult<Relocated> {
    validate_entry_name(new_name)?;
    let parent = path
        .parent()
        .ok_or_else(|| FsError::generic("invalid path: no parent directory"))?;
    let dst = parent.join(new_name);

    ensure_vacant(&dst)?;
    fs::rename(path, &dst)?;
    Ok(Relocated::to(display(&dst)))
}

/// Recursively delete a file or directory.
///
/// A missing target is reported as [`FsError::NotFound`], not ignored.
///
/// # Errors
///
/// The classified error from the removal.
pub fn delete(path: &Path) -> FsResult<()> {
    remove_tree(path)
}

/// Set permission bits from an octal string such as `"755"` or `"0644"`.
///
/// # Errors
///
/// Generic for an unparseable mode, otherwise the classified error from
/// `chmod`.
pub fn chmod(path: &Path, mode: &str) -> FsResult<()> {
    let bits = parse_mode(mode)?;
    fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    Ok(())
}

/// Change owner and/or group. Empty strings leave that id unchanged; numeric
/// strings are used as ids directly, anything else is looked up by name.
///
/// Does not follow a final symlink.
///
/// # Errors
///
/// Generic for an unknown user or group, otherwise the classified error from
/// `lchown`.
pub fn chown(path: &Path, owner: &str, group: &str) -> FsResult<()> {
    let uid = resolve_owner(owner)?;
    let gid = resolve_group(group)?;
    lchown(path, uid, gid)?;
    Ok(())
}

fn parse_mode(mode: &str) -> FsResult<u32> {
    let digits = mode.strip_prefix("0o").unwrap_or(mode);
    match u32::from_str_radix(digits, 8) {
        Ok(bits) if !digits.is_empty() && bits <= 0o7777 => Ok(bits),
        _ => Err(FsError::generic(format!("invalid mode {mode:?}"))),
    }
}

fn resolve_owner(owner: &str) -> FsResult<Option<u32>> {
    if owner.is_empty() {
        return Ok(None);
    }
    if let Ok(uid) = owner.parse::<u32>() {
        return Ok(Some(uid));
    }
    match User::from_name(owner) {
        Ok(Some(user)) => Ok(Some(user.uid.as_raw())),
        Ok(None) => Err(FsError::generic(format!("unknown user {owner:?}"))),
        Err(e) => Err(FsError::generic(format!("user {owner:?}: {e}"))),
    }
}

fn resolve_group(group: &str) -> FsResult<Option<u32>> {
    if group.is_empty() {
        return Ok(None);
    }
    if let Ok(gid) = group.parse::<u32>() {
        return Ok(Some(gid));
    }
    match Group::from_name(group) {
        Ok(Some(g)) => Ok(Some(g.gid.as_raw())),
        Ok(None) => Err(FsError::generic(format!("unknown group {group:?}"))),
        Err(e) => Err(FsError::generic(format!("group {group:?}: {e}"))),
    }
}

fn final_component(path: &Path) -> FsResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FsError::generic("invalid path: no final component"))
}

fn ensure_vacant(path: &Path) -> FsResult<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => Err(FsError::AlreadyExists),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
