//! Read-only operations: list, stat, read.

use std::fs::{self, File, Metadata};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use nix::unistd::{Gid, Group, Uid, User};
use privfs_core::{EntryKind, FsResult, ListEntry, StatRecord};
use tracing::debug;

use crate::display;

/// Largest number of bytes [`read`] returns. Anything past it is dropped.
pub const READ_CAP: u64 = 64 * 1024 * 1024;

/// Enumerate a directory.
///
/// Entries are stat'ed through symlinks; an entry that vanishes (or cannot be
/// stat'ed) between enumeration and stat is skipped. Results are sorted by
/// name.
///
/// # Errors
///
/// Returns the classified error from opening or iterating the directory.
pub fn list(path: &Path) -> FsResult<Vec<ListEntry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let full = entry.path();
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %full.display(), error = %e, "skipping entry");
                continue;
            },
        };

        let kind = kind_of(&meta);
        entries.push(ListEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: display(&full),
            kind,
            size: size_of(kind, &meta),
            mtime: meta.modified().map(format_mtime).unwrap_or_default(),
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Stat a path without following a final symlink.
///
/// # Errors
///
/// Returns the classified error from `lstat`.
pub fn stat(path: &Path) -> FsResult<StatRecord> {
    let meta = fs::symlink_metadata(path)?;
    let kind = kind_of(&meta);

    Ok(StatRecord {
        mode: format!("{:03o}", meta.mode() & 0o777),
        owner: owner_name(meta.uid()),
        group: group_name(meta.gid()),
        uid: meta.uid(),
        gid: meta.gid(),
        kind,
        size: size_of(kind, &meta),
    })
}

/// Read a file, silently truncated at [`READ_CAP`].
///
/// # Errors
///
/// Returns the classified error from opening or reading the file.
pub fn read(path: &Path) -> FsResult<Vec<u8>> {
    read_capped(path, READ_CAP)
}

/// Read at most `cap` bytes of a file.
///
/// # Errors
///
/// Returns the classified error from opening or reading the file.
pub fn read_capped(path: &Path, cap: u64) -> FsResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut buf = Vec::new();
    file.take(cap).read_to_end(&mut buf)?;
    Ok(buf)
}

fn kind_of(meta: &Metadata) -> EntryKind {
    if meta.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    }
}

fn size_of(kind: EntryKind, meta: &Metadata) -> Option<u64> {
    match kind {
        EntryKind::File => Some(meta.len()),
        EntryKind::Dir => None,
    }
}

fn format_mtime(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

fn owner_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use privfs_core::FsError;

    use super::*;

    #[test]
    fn mtime_has_millisecond_precision_and_z_suffix() {
        let formatted = format_mtime(SystemTime::UNIX_EPOCH);
        assert_eq!(formatted, "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn list_reports_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();

        let entries = list(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[0].size, None);

        assert_eq!(entries[1].name, "b.txt");
        assert_eq!(entries[1].kind, EntryKind::File);
        assert_eq!(entries[1].size, Some(5));
        assert_eq!(entries[1].path, display(&dir.path().join("b.txt")));
        assert!(entries[1].mtime.ends_with('Z'));
    }

    #[test]
    fn list_skips_dangling_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();
        fs::write(dir.path().join("kept"), b"").unwrap();

        let entries = list(dir.path()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["kept"]);
    }

    #[test]
    fn list_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            list(&dir.path().join("missing")).unwrap_err(),
            FsError::NotFound
        );
    }

    #[test]
    fn stat_reports_mode_and_ids() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"abc").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let record = stat(&file).unwrap();
        assert_eq!(record.mode, "640");
        assert_eq!(record.kind, EntryKind::File);
        assert_eq!(record.size, Some(3));
        assert_eq!(record.uid, nix::unistd::geteuid().as_raw());
        assert!(!record.owner.is_empty());
    }

    #[test]
    fn stat_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(stat(&target).unwrap().kind, EntryKind::Dir);
        assert_eq!(stat(&link).unwrap().kind, EntryKind::File);
    }

    #[test]
    fn read_truncates_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"0123456789").unwrap();

        assert_eq!(read(&file).unwrap(), b"0123456789");
        assert_eq!(read_capped(&file, 10).unwrap(), b"0123456789");
        assert_eq!(read_capped(&file, 9).unwrap(), b"012345678");
        assert_eq!(read_capped(&file, 4).unwrap(), b"0123");
    }

    #[test]
    fn read_returns_a_file_exactly_at_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("exact");
        let cap = usize::try_from(READ_CAP).unwrap();
        fs::write(&file, vec![7_u8; cap]).unwrap();

        let content = read(&file).unwrap();
        assert_eq!(content.len(), cap);
        assert!(content.iter().all(|&b| b == 7));
    }

    #[test]
    fn read_one_byte_over_the_cap_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("over");
        let cap = usize::try_from(READ_CAP).unwrap();
        let mut data = vec![7_u8; cap];
        data.push(9);
        fs::write(&file, &data).unwrap();

        let content = read(&file).unwrap();
        assert_eq!(content.len(), cap);
        assert_eq!(content.last(), Some(&7));
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read(&dir.path().join("nope")).unwrap_err(), FsError::NotFound);
    }
}
